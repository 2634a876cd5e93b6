//! # Silo
//!
//! A uniform, backend-agnostic store for indexed entries: rows keyed by a
//! single designated index field, persisted either as partitioned CSV
//! files behind a storage adapter or as an embedded SQLite mirror.
//!
//! Describe the data once as a typed [`Template`], pick a backend (and,
//! for CSV, a [`Partitioner`]), and use the same surface everywhere:
//! [`EntryStore::get`], [`EntryStore::first`]/[`EntryStore::last`] and
//! their key projections, [`EntryStore::fields`], and batched
//! [`EntryStore::put`] with at-most-once semantics per key.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silo::{
//!     CsvStore, Entry, EntryStore, FieldKind, LocalStorage, ScalarKind, Template, Value,
//!     YearMonthPartitioner,
//! };
//!
//! async fn example() -> Result<(), silo::CsvError> {
//!     let template = Template::new("timestamp")
//!         .field("timestamp", FieldKind::scalar(ScalarKind::Date))
//!         .field("value", FieldKind::scalar(ScalarKind::String));
//!
//!     let store = CsvStore::with_template(
//!         Arc::new(LocalStorage::new("./data")),
//!         Arc::new(YearMonthPartitioner::new()),
//!         template,
//!     );
//!
//!     let entry = Entry::new()
//!         .with("timestamp", Value::date_from_timestamp_millis(946_684_800_000).unwrap())
//!         .with("value", "2000-01-01");
//!     store.put(vec![entry]).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! - [`CsvStore`] - partitioned text files; append-fast for strictly
//!   newer batches, merge-rewrite otherwise; duplicate keys keep the
//!   latest occurrence on rewrite
//! - [`SqliteStore`] - relational mirror; duplicate keys keep the
//!   earliest value via `ON CONFLICT DO NOTHING`

pub use silo_core::{
    codec, is_compliant_name, CoreError, DerivedKind, Entry, EntryStore, FieldDiff, FieldKind,
    ScalarKind, Schema, SchemaDiff, SqlValue, Template, TypeMap, Value,
};
pub use silo_csv::{CsvError, CsvStore};
pub use silo_sqlite::{SqliteError, SqliteStore};
pub use silo_storage::{
    FixedSizePartitioner, LocalStorage, MemoryStorage, Partitioner, PartitionRange,
    SinglePartitioner, StorageAdapter, StorageError, YearMonthPartitioner,
};
