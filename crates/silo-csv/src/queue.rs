//! Per-partition write queues and the append/rewrite engine.
//!
//! Each partition gets a cargo-style queue: an unbounded channel feeding
//! a single consumer task. The consumer takes whatever is queued, merges
//! it into one batch, drains it with a single append or rewrite, and
//! acknowledges every waiter. Queues for distinct partitions drain
//! concurrently; each queue is strictly sequential in enqueue order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use silo_core::{codec, Entry, Schema};
use silo_storage::StorageAdapter;

use crate::error::{CsvError, Result};
use crate::rows;

struct Job {
    entries: Vec<Entry>,
    ack: oneshot::Sender<std::result::Result<(), String>>,
}

/// Handle to one partition's writer task.
pub(crate) struct PartitionQueue {
    partition: String,
    tx: mpsc::UnboundedSender<Job>,
}

impl PartitionQueue {
    /// Spawn the consumer task for a partition.
    pub(crate) fn spawn(
        partition: String,
        schema: Arc<Schema>,
        adapter: Arc<dyn StorageAdapter>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(consume(partition.clone(), schema, adapter, rx));
        Self { partition, tx }
    }

    /// Enqueue a batch; returns the receiver that resolves when the batch
    /// has drained. Enqueueing is synchronous so a caller can submit to
    /// many queues before awaiting any of them.
    pub(crate) fn submit(
        &self,
        entries: Vec<Entry>,
    ) -> Result<oneshot::Receiver<std::result::Result<(), String>>> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Job { entries, ack })
            .map_err(|_| CsvError::Channel(format!("writer for {:?} is gone", self.partition)))?;
        Ok(rx)
    }
}

async fn consume(
    partition: String,
    schema: Arc<Schema>,
    adapter: Arc<dyn StorageAdapter>,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.recv().await {
        let mut entries = job.entries;
        let mut acks = vec![job.ack];
        // Take whatever else is queued and drain it as one batch.
        while let Ok(more) = rx.try_recv() {
            entries.extend(more.entries);
            acks.push(more.ack);
        }

        let outcome = drain(&partition, &schema, adapter.as_ref(), entries).await;
        let failure = outcome.err().map(|e| e.to_string());
        if let Some(message) = &failure {
            tracing::warn!(partition = %partition, error = %message, "partition drain failed");
        }
        for ack in acks {
            let _ = ack.send(match &failure {
                None => Ok(()),
                Some(message) => Err(message.clone()),
            });
        }
    }
}

/// Deduplicate by key (latest occurrence in iteration order wins) and
/// sort ascending by key.
fn normalize(schema: &Schema, entries: Vec<Entry>) -> Result<Vec<Entry>> {
    let mut out: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut by_key: HashMap<String, usize> = HashMap::with_capacity(entries.len());

    for entry in entries {
        let key = schema
            .key_of(&entry)
            .ok_or_else(|| CsvError::Malformed("entry is missing its index value".to_string()))?;
        // The hydrated cell is a canonical, hashable spelling of the key.
        let cell = codec::csv::hydrate(key)?;
        match by_key.get(&cell) {
            Some(&i) => out[i] = entry,
            None => {
                by_key.insert(cell, out.len());
                out.push(entry);
            }
        }
    }

    out.sort_by(|a, b| {
        let ka = schema.key_of(a).expect("normalized entries carry keys");
        let kb = schema.key_of(b).expect("normalized entries carry keys");
        ka.cmp_key(kb).unwrap_or(Ordering::Equal)
    });
    Ok(out)
}

/// Drain one batch into its partition.
///
/// Append mode applies iff the partition file exists and the batch's
/// minimum key is strictly greater than the file's last entry key;
/// otherwise the partition is read, merged, deduplicated and rewritten.
async fn drain(
    partition: &str,
    schema: &Schema,
    adapter: &dyn StorageAdapter,
    entries: Vec<Entry>,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let batch = normalize(schema, entries)?;
    let path = rows::file_name(partition);

    if adapter.exists(&path).await? {
        if let Some(last) = rows::last_entry(adapter, schema, &path).await? {
            let last_key = last
                .get(schema.index())
                .ok_or_else(|| CsvError::Malformed(format!("{path}: last row has no key")))?;
            let min_key = schema.key_of(&batch[0]).expect("normalized batch");
            if min_key.cmp_key(last_key) == Some(Ordering::Greater) {
                let text = rows::emit(schema, &batch, false)?;
                adapter.append(&path, &text).await?;
                tracing::debug!(partition, rows = batch.len(), "appended batch");
                return Ok(());
            }
        }
        let existing = rows::parse(schema, &adapter.read(&path).await?)?;
        let merged = normalize(schema, existing.into_iter().chain(batch).collect())?;
        let text = rows::emit(schema, &merged, true)?;
        adapter.write(&path, &text).await?;
        tracing::debug!(partition, rows = merged.len(), "rewrote partition");
    } else {
        let text = rows::emit(schema, &batch, true)?;
        adapter.write(&path, &text).await?;
        tracing::debug!(partition, rows = batch.len(), "created partition");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::{FieldKind, ScalarKind, Template, Value};
    use silo_storage::MemoryStorage;

    fn schema() -> Schema {
        Schema::from_template(
            &Template::new("timestamp")
                .field("timestamp", FieldKind::scalar(ScalarKind::Date))
                .field("value", FieldKind::scalar(ScalarKind::String)),
        )
        .unwrap()
    }

    fn entry(secs: i64, value: &str) -> Entry {
        Entry::new()
            .with(
                "timestamp",
                Value::date_from_timestamp_millis(secs * 1000).unwrap(),
            )
            .with("value", value)
    }

    #[test]
    fn normalize_dedupes_keeping_latest_and_sorts() {
        let schema = schema();
        let out = normalize(
            &schema,
            vec![entry(2, "b"), entry(1, "a"), entry(2, "b-final")],
        )
        .unwrap();
        assert_eq!(out, vec![entry(1, "a"), entry(2, "b-final")]);
    }

    #[tokio::test]
    async fn drain_creates_partition_with_header() {
        let storage = MemoryStorage::new();
        drain("2000-01", &schema(), &storage, vec![entry(946_684_800, "x")])
            .await
            .unwrap();
        assert_eq!(
            storage.read("2000-01.csv").await.unwrap(),
            "timestamp,value\n946684800,x\n"
        );
    }

    #[tokio::test]
    async fn drain_appends_strictly_newer_batch() {
        let storage = MemoryStorage::new();
        let schema = schema();
        drain("p", &schema, &storage, vec![entry(100, "a")]).await.unwrap();
        let before = storage.read("p.csv").await.unwrap();

        drain("p", &schema, &storage, vec![entry(200, "b"), entry(300, "c")])
            .await
            .unwrap();
        let after = storage.read("p.csv").await.unwrap();
        // Prior prefix bytes are unchanged.
        assert!(after.starts_with(&before));
        assert_eq!(after, "timestamp,value\n100,a\n200,b\n300,c\n");
    }

    #[tokio::test]
    async fn drain_rewrites_out_of_order_batch() {
        let storage = MemoryStorage::new();
        let schema = schema();
        drain("p", &schema, &storage, vec![entry(100, "a"), entry(300, "c")])
            .await
            .unwrap();
        drain("p", &schema, &storage, vec![entry(200, "b")]).await.unwrap();

        assert_eq!(
            storage.read("p.csv").await.unwrap(),
            "timestamp,value\n100,a\n200,b\n300,c\n"
        );
    }

    #[tokio::test]
    async fn drain_rewrite_dedupes_keeping_latest() {
        let storage = MemoryStorage::new();
        let schema = schema();
        drain("p", &schema, &storage, vec![entry(100, "old")]).await.unwrap();
        drain("p", &schema, &storage, vec![entry(100, "new")]).await.unwrap();

        assert_eq!(
            storage.read("p.csv").await.unwrap(),
            "timestamp,value\n100,new\n"
        );
    }

    #[tokio::test]
    async fn batch_equal_to_last_key_rewrites_not_appends() {
        let storage = MemoryStorage::new();
        let schema = schema();
        drain("p", &schema, &storage, vec![entry(100, "a"), entry(200, "b")])
            .await
            .unwrap();
        // min(batch) == existing last key: append mode requires strictly
        // greater, so this must rewrite.
        drain("p", &schema, &storage, vec![entry(200, "b2"), entry(300, "c")])
            .await
            .unwrap();

        assert_eq!(
            storage.read("p.csv").await.unwrap(),
            "timestamp,value\n100,a\n200,b2\n300,c\n"
        );
    }

    #[tokio::test]
    async fn queue_serializes_and_acknowledges() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let schema = Arc::new(schema());
        let queue = PartitionQueue::spawn("p".to_string(), schema, storage.clone());

        let rx1 = queue.submit(vec![entry(1, "a")]).unwrap();
        let rx2 = queue.submit(vec![entry(2, "b")]).unwrap();
        rx1.await.unwrap().unwrap();
        rx2.await.unwrap().unwrap();

        assert_eq!(
            storage.read("p.csv").await.unwrap(),
            "timestamp,value\n1,a\n2,b\n"
        );
    }
}
