//! SQLite backend
//!
//! Schema introspection, field/column mapping, statement generation, key
//! reservation and the relational and document stores built on them.

pub mod catalog;
pub mod mapping;
pub mod statement;
pub mod reservation;
mod db_core;
mod relational;
mod document;

pub use catalog::{Catalog, ColumnDescriptor, TableInfo};
pub use db_core::{Affected, SqliteCore};
pub use document::{Document, DocumentStore};
pub use mapping::{ColumnMapping, TableMapping};
pub use relational::RelationalStore;
pub use reservation::KeyRange;
