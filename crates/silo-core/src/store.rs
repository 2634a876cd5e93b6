//! The uniform store interface every backend implements.

use async_trait::async_trait;

use crate::entry::Entry;
use crate::value::Value;

/// The backend-agnostic operational surface of a store.
///
/// A store holds entries of a single resolved schema, keyed by the
/// schema's index field. Implementations resolve their schema lazily on
/// first contact and keep it for the store's lifetime.
///
/// # Design Notes
///
/// - **At-most-once per key**: a second `put` of an existing key yields
///   exactly one stored entry; which occurrence survives is
///   backend-defined and documented on each implementation.
/// - **No partial observation**: `put` resolves only once every touched
///   partition or write task has drained; reads issued afterwards see all
///   of its entries.
/// - **None over errors**: boundary probes and lookups on an empty store
///   return `None`, not an error.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Backend-specific error type; the core taxonomy surfaces through it
    /// verbatim.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Field names of the resolved schema, in declaration order.
    async fn fields(&self) -> Result<Vec<String>, Self::Error>;

    /// The entry with the smallest key, or `None` on an empty store.
    async fn first(&self) -> Result<Option<Entry>, Self::Error>;

    /// The entry with the largest key, or `None` on an empty store.
    async fn last(&self) -> Result<Option<Entry>, Self::Error>;

    /// The smallest key, or `None` on an empty store.
    async fn first_key(&self) -> Result<Option<Value>, Self::Error>;

    /// The largest key, or `None` on an empty store.
    async fn last_key(&self) -> Result<Option<Value>, Self::Error>;

    /// Look up an entry by its key.
    async fn get(&self, key: &Value) -> Result<Option<Entry>, Self::Error>;

    /// Submit entries; resolves when every touched write queue drained.
    async fn put(&self, entries: Vec<Entry>) -> Result<(), Self::Error>;
}
