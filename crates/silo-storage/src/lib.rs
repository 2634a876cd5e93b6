//! # Silo Storage
//!
//! The file-like namespace behind silo's CSV engine, and the partitioners
//! that carve it up.
//!
//! ## Key Types
//!
//! - [`StorageAdapter`] - the async capability set (list, probe, read,
//!   append, atomic write) and the only surface the CSV engine uses to
//!   touch persistent state
//! - [`LocalStorage`] - adapter over a local directory tree
//! - [`MemoryStorage`] - map-backed adapter for tests and embedding
//! - [`Partitioner`] - pure mapping from index values to partition names
//! - [`SinglePartitioner`], [`FixedSizePartitioner`],
//!   [`YearMonthPartitioner`] - reference partitioners

pub mod adapter;
pub mod error;
pub mod local;
pub mod memory;
pub mod partition;

pub use adapter::StorageAdapter;
pub use error::{Result, StorageError};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use partition::{
    DateCoercion, FixedSizePartitioner, Partitioner, PartitionRange, SinglePartitioner,
    YearMonthPartitioner,
};
