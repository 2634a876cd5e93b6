//! Error taxonomy shared by every backend.

use thiserror::Error;

use crate::entry::Entry;
use crate::schema::SchemaDiff;

/// Errors surfaced verbatim to callers. No retry, no fallback.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Neither a template nor a persisted schema is available.
    #[error("no schema available: supply a template or open a populated store")]
    MissingSchema,

    /// The declared template and the persisted schema differ.
    #[error("declared template does not match the stored schema:\n{0}")]
    SchemaMismatched(SchemaDiff),

    /// A submitted entry does not conform to the schema.
    #[error("entry does not conform to the schema:\n{diff}\nentry: {entry:?}")]
    Validation { diff: SchemaDiff, entry: Entry },

    /// A value cannot be carried in any backend-native form.
    #[error("unsupported value: {0}")]
    UnsupportedType(String),

    /// A declared field's kind could not be resolved.
    #[error("kind of field {field:?} could not be determined: {reason}")]
    TypeUndetermined { field: String, reason: String },

    /// A field name violates the `[A-Za-z0-9_]+` rule.
    #[error("field name {0:?} violates [A-Za-z0-9_]+")]
    NonCompliantKey(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
