//! Storage layer error types.

use thiserror::Error;

/// Errors from the local table store and its row sources.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("invalid table name {name:?}: {reason}")]
    InvalidTableName { name: String, reason: String },

    #[error("row has {actual} values but table {table} has {expected} columns")]
    ArityMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// The backing encoding could not produce the requested range at all.
    #[error("cannot read rows from {table}: {reason}")]
    ReadFailure { table: String, reason: String },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
