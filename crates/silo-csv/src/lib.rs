//! # Silo CSV
//!
//! The partitioned CSV backend: append-fast, rewrite-safe batched writes
//! over a storage adapter and a partitioner.
//!
//! ## Layout
//!
//! The adapter root holds `schema.json` (the persisted schema as a
//! `{field: token}` JSON object) and one `<partition>.csv` per populated
//! partition: UTF-8, LF line endings, header row of field names in schema
//! order, one entry per row.
//!
//! ## Write discipline
//!
//! Each partition has a cargo-style queue draining whatever is enqueued
//! as one batch. A batch strictly newer than the partition's last entry
//! is appended without reading the file; anything else merges, dedupes by
//! key (latest occurrence wins), sorts ascending and rewrites. Queues for
//! distinct partitions drain concurrently.

pub mod error;
mod queue;
mod rows;
pub mod store;

pub use error::{CsvError, Result};
pub use store::CsvStore;
