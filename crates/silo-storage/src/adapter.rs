//! Storage adapter trait: the opaque file-like namespace behind the CSV
//! engine.
//!
//! This capability set is the only surface the CSV engine uses to touch
//! persistent state. Implementations include a local directory tree
//! ([`LocalStorage`](crate::LocalStorage)) and an in-memory map
//! ([`MemoryStorage`](crate::MemoryStorage)) for tests and embedding.

use async_trait::async_trait;

use crate::error::Result;

/// An adapter-rooted namespace of UTF-8 text files.
///
/// Paths are relative to an adapter-defined root. All content is treated
/// as newline-delimited UTF-8 text.
///
/// # Design Notes
///
/// - **Bounded probes**: `head` and `tail` must not read the whole file
///   for a bounded `n`; they probe the file size and read in small chunks
///   from the respective end until `n` newlines are observed.
/// - **Terminators preserved**: both probes return lines *including*
///   their newline terminators, so `head(p, 1) + tail(p, 1)` concatenates
///   into two complete lines.
/// - **Atomic replace**: `write` replaces file contents atomically at the
///   per-file granularity; `append` creates-if-missing and extends.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// List files under the root with the given extension (`"*"` for
    /// any). Hidden dot-entries are excluded; results are relative paths
    /// in lexicographic order.
    async fn collection(&self, extension: &str) -> Result<Vec<String>>;

    /// Whether the file exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Size of the file in bytes.
    async fn size(&self, path: &str) -> Result<u64>;

    /// Read the whole file.
    async fn read(&self, path: &str) -> Result<String>;

    /// The first `n` newline-terminated lines, terminators included, or
    /// the whole file if it has fewer than `n` lines.
    async fn head(&self, path: &str, n: usize) -> Result<String>;

    /// The last `n` lines, terminators included, or the whole file if it
    /// has fewer than `n` lines.
    async fn tail(&self, path: &str, n: usize) -> Result<String>;

    /// Append to the file, creating it (and parent directories) as
    /// needed.
    async fn append(&self, path: &str, data: &str) -> Result<()>;

    /// Atomically replace the file contents, creating parent directories
    /// as needed.
    async fn write(&self, path: &str, data: &str) -> Result<()>;
}
