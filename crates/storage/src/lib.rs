// Keel Storage Layer
//
// Record stores behind one façade contract with pluggable backends

pub mod trait_;
pub mod memory;
pub mod blocking;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use trait_::*;
pub use memory::MemoryStore;
pub use blocking::BlockingStore;
