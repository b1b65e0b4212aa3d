//! Keel Core - record mapping primitives
//!
//! Contains:
//! - Value/FieldValue: typed cells and field conversions
//! - Record: per-type mapping contract, generated by `impl_record!`
//! - Statement/Delimiter: parameter-bound SQL
//! - StoreError: error taxonomy shared by every store
//! - config: connection-string resolution and connection options

mod value;
mod record;
mod statement;
mod error;
pub mod config;

pub use value::*;
pub use record::*;
pub use statement::*;
pub use error::*;
