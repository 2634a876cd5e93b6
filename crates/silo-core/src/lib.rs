//! # Silo Core
//!
//! Core primitives for silo: the closed value union, schemas and the
//! textual schema grammar, reflection and validation, per-backend value
//! codecs, and the [`EntryStore`] trait.
//!
//! This crate contains no I/O. Backends (`silo-csv`, `silo-sqlite`) and
//! the storage layer (`silo-storage`) build on it.
//!
//! ## Key Types
//!
//! - [`Value`] / [`Entry`] - what a store holds
//! - [`Schema`] / [`Template`] - the declared and resolved shape of entries
//! - [`EntryStore`] - the uniform operational surface of every backend
//! - [`CoreError`] - the error taxonomy surfaced verbatim by backends
//!
//! ## Grammar
//!
//! Each field encodes to a token like `*Date`, `[URL]` or `Number?`; a
//! schema persists as a `{field: token}` JSON object. See [`schema`].

pub mod codec;
pub mod entry;
pub mod error;
pub mod schema;
pub mod store;
pub mod validate;
pub mod value;

pub use codec::sql::SqlValue;
pub use entry::Entry;
pub use error::{CoreError, Result};
pub use schema::{
    is_compliant_name, FieldDiff, FieldKind, ScalarKind, Schema, SchemaDiff, Template,
};
pub use store::EntryStore;
pub use validate::{derive_kind, DerivedKind, TypeMap};
pub use value::Value;
