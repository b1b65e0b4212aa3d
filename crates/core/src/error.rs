//! Store error taxonomy

use crate::config::ConfigError;
use crate::value::ValueError;

/// Store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Table not found: {0}")]
    TableMissing(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Key reservation failed: {0}")]
    Reservation(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Wrap a value conversion failure for a named field
    pub fn field(field: &str, err: ValueError) -> Self {
        StoreError::Mapping(format!("field `{}`: {}", field, err))
    }

    /// Whether the failure means the addressed table does not exist
    pub fn is_table_missing(&self) -> bool {
        matches!(self, StoreError::TableMissing(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
