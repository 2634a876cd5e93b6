//! Error types for the CSV backend.

use thiserror::Error;

use silo_core::CoreError;
use silo_storage::StorageError;

/// Errors that can occur in the CSV store.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Schema, validation or codec error from the core taxonomy.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage adapter fault.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// CSV framing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A partition file or schema.json is structurally broken.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// A partition's write queue failed while draining.
    ///
    /// Carries the rendered cause: the drain acknowledges every waiter of
    /// the failed batch, so the payload must be owned and shareable.
    #[error("write to partition {partition:?} failed: {message}")]
    PartitionWrite { partition: String, message: String },

    /// Queue plumbing failure (a writer task is gone).
    #[error("partition queue error: {0}")]
    Channel(String),
}

/// Result type for CSV store operations.
pub type Result<T> = std::result::Result<T, CsvError>;
