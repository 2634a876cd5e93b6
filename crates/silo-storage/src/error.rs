//! Error types for the storage layer.

use thiserror::Error;

/// Errors that can occur in a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path escapes the adapter root or is otherwise malformed.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// Stored bytes are not valid UTF-8 text.
    #[error("invalid data in {path:?}: {detail}")]
    InvalidData { path: String, detail: String },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
