//! Error types for the SQLite backend.

use thiserror::Error;

use silo_core::CoreError;

/// Errors that can occur in the SQLite store.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Schema, validation or codec error from the core taxonomy.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored data does not match the schema's expectations.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// A blocking database task failed to complete.
    #[error("database task failed: {0}")]
    Task(String),
}

/// Result type for SQLite store operations.
pub type Result<T> = std::result::Result<T, SqliteError>;
