//! The partitioned CSV store.
//!
//! Reserves `schema.json` at the adapter root for the persisted schema;
//! all data lives in `<partition>.csv` files, header row first. Boundary
//! probes (`first`/`last`) read at most two lines per touched file.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use silo_core::{CoreError, Entry, EntryStore, Schema, Template, Value};
use silo_storage::{Partitioner, PartitionRange, StorageAdapter};

use crate::error::{CsvError, Result};
use crate::queue::PartitionQueue;
use crate::rows;

/// Reserved file for the persisted schema.
const SCHEMA_FILE: &str = "schema.json";

/// A store over a partitioned namespace of CSV files.
///
/// Construction takes a storage adapter, a partitioner, and optionally a
/// declared template. The schema resolves lazily on first contact:
/// a persisted `schema.json` must equal the template if both exist, a
/// template alone is persisted, and neither fails with
/// [`CoreError::MissingSchema`].
///
/// Duplicate keys: a rewrite merge keeps the *latest* occurrence in
/// iteration order.
pub struct CsvStore {
    adapter: Arc<dyn StorageAdapter>,
    partitioner: Arc<dyn Partitioner>,
    template: Option<Template>,
    schema: OnceCell<Arc<Schema>>,
    queues: Mutex<HashMap<String, PartitionQueue>>,
}

impl CsvStore {
    /// Open a store over an existing backing; the schema must already be
    /// persisted.
    pub fn new(adapter: Arc<dyn StorageAdapter>, partitioner: Arc<dyn Partitioner>) -> Self {
        Self {
            adapter,
            partitioner,
            template: None,
            schema: OnceCell::new(),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Open a store with a declared template, persisted on first use if
    /// no schema is stored yet.
    pub fn with_template(
        adapter: Arc<dyn StorageAdapter>,
        partitioner: Arc<dyn Partitioner>,
        template: Template,
    ) -> Self {
        Self {
            template: Some(template),
            ..Self::new(adapter, partitioner)
        }
    }

    /// Resolve (and cache) the store's schema.
    async fn schema(&self) -> Result<Arc<Schema>> {
        self.schema
            .get_or_try_init(|| async {
                let stored = if self.adapter.exists(SCHEMA_FILE).await? {
                    let text = self.adapter.read(SCHEMA_FILE).await?;
                    let map: serde_json::Map<String, serde_json::Value> =
                        serde_json::from_str(&text).map_err(|e| {
                            CsvError::Malformed(format!("{SCHEMA_FILE}: {e}"))
                        })?;
                    Some(Schema::decode(&map)?)
                } else {
                    None
                };
                let declared = self
                    .template
                    .as_ref()
                    .map(Schema::from_template)
                    .transpose()?;

                let schema = match (stored, declared) {
                    (None, None) => return Err(CoreError::MissingSchema.into()),
                    (Some(stored), None) => stored,
                    (None, Some(declared)) => {
                        let text = serde_json::to_string(&declared.encode()).map_err(|e| {
                            CsvError::Malformed(format!("schema encoding failed: {e}"))
                        })?;
                        self.adapter.write(SCHEMA_FILE, &text).await?;
                        tracing::debug!("persisted schema to {SCHEMA_FILE}");
                        declared
                    }
                    (Some(stored), Some(declared)) => {
                        if let Some(diff) = declared.diff(&stored) {
                            return Err(CoreError::SchemaMismatched(diff).into());
                        }
                        stored
                    }
                };
                Ok(Arc::new(schema))
            })
            .await
            .cloned()
    }

    /// The first/last populated partitions, from the current listing.
    async fn boundaries(&self) -> Result<Option<PartitionRange>> {
        let files = self.adapter.collection("csv").await?;
        let names: Vec<String> = files
            .iter()
            .filter_map(|f| f.strip_suffix(".csv"))
            .map(String::from)
            .collect();
        Ok(self.partitioner.range(&names))
    }

    async fn entry_at(&self, partition: &str, last: bool) -> Result<Option<Entry>> {
        let schema = self.schema().await?;
        let path = rows::file_name(partition);
        if !self.adapter.exists(&path).await? {
            return Ok(None);
        }
        if last {
            rows::last_entry(self.adapter.as_ref(), &schema, &path).await
        } else {
            rows::first_entry(self.adapter.as_ref(), &schema, &path).await
        }
    }

    fn project_key(schema: &Schema, entry: Option<Entry>) -> Option<Value> {
        entry.and_then(|e| e.get(schema.index()).cloned())
    }
}

#[async_trait]
impl EntryStore for CsvStore {
    type Error = CsvError;

    async fn fields(&self) -> Result<Vec<String>> {
        Ok(self.schema().await?.field_names())
    }

    async fn first(&self) -> Result<Option<Entry>> {
        self.schema().await?;
        match self.boundaries().await? {
            Some(range) => self.entry_at(&range.first, false).await,
            None => Ok(None),
        }
    }

    async fn last(&self) -> Result<Option<Entry>> {
        self.schema().await?;
        match self.boundaries().await? {
            Some(range) => self.entry_at(&range.last, true).await,
            None => Ok(None),
        }
    }

    async fn first_key(&self) -> Result<Option<Value>> {
        let schema = self.schema().await?;
        Ok(Self::project_key(&schema, self.first().await?))
    }

    async fn last_key(&self) -> Result<Option<Value>> {
        let schema = self.schema().await?;
        Ok(Self::project_key(&schema, self.last().await?))
    }

    async fn get(&self, key: &Value) -> Result<Option<Entry>> {
        let schema = self.schema().await?;
        let partition = self.partitioner.partition(key)?;
        let path = rows::file_name(&partition);
        if !self.adapter.exists(&path).await? {
            return Ok(None);
        }
        let entries = rows::parse(&schema, &self.adapter.read(&path).await?)?;
        Ok(entries
            .into_iter()
            .find(|entry| schema.key_of(entry) == Some(key)))
    }

    async fn put(&self, entries: Vec<Entry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let schema = self.schema().await?;
        for entry in &entries {
            schema.validate(entry)?;
        }

        let mut buckets: HashMap<String, Vec<Entry>> = HashMap::new();
        for entry in entries {
            let key = schema.key_of(&entry).expect("validated entries carry keys");
            let partition = self.partitioner.partition(key)?;
            buckets.entry(partition).or_default().push(entry);
        }

        // Submit to every touched queue before awaiting any drain, so
        // independent partitions proceed concurrently.
        let mut pending = Vec::with_capacity(buckets.len());
        {
            let mut queues = self.queues.lock().unwrap();
            for (partition, batch) in buckets {
                let queue = queues.entry(partition.clone()).or_insert_with(|| {
                    PartitionQueue::spawn(partition.clone(), schema.clone(), self.adapter.clone())
                });
                pending.push((partition, queue.submit(batch)?));
            }
        }

        // Await every drain; surface the first failure after all have
        // settled (committed partitions stay committed).
        let mut failure = None;
        for (partition, rx) in pending {
            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    failure.get_or_insert(CsvError::PartitionWrite { partition, message });
                }
                Err(_) => {
                    failure.get_or_insert(CsvError::Channel(format!(
                        "writer for {partition:?} dropped its acknowledgement"
                    )));
                }
            }
        }
        match failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::{FieldKind, ScalarKind};
    use silo_storage::{MemoryStorage, YearMonthPartitioner};

    fn timeline() -> Template {
        Template::new("timestamp")
            .field("timestamp", FieldKind::scalar(ScalarKind::Date))
            .field("value", FieldKind::scalar(ScalarKind::String))
    }

    fn entry(secs: i64, value: &str) -> Entry {
        Entry::new()
            .with(
                "timestamp",
                Value::date_from_timestamp_millis(secs * 1000).unwrap(),
            )
            .with("value", value)
    }

    fn store(adapter: Arc<MemoryStorage>) -> CsvStore {
        CsvStore::with_template(
            adapter,
            Arc::new(YearMonthPartitioner::new()),
            timeline(),
        )
    }

    #[tokio::test]
    async fn put_persists_schema_and_rows() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter.clone());

        store.put(vec![entry(946_684_800, "2000-01-01")]).await.unwrap();

        assert_eq!(
            adapter.collection("*").await.unwrap(),
            vec!["2000-01.csv", "schema.json"]
        );
        assert_eq!(
            adapter.read("2000-01.csv").await.unwrap(),
            "timestamp,value\n946684800,2000-01-01\n"
        );
        let schema_text = adapter.read("schema.json").await.unwrap();
        assert_eq!(schema_text, r#"{"timestamp":"*Date","value":"String"}"#);
    }

    #[tokio::test]
    async fn read_your_writes() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter);
        let e = entry(946_684_800, "2000-01-01");

        store.put(vec![e.clone()]).await.unwrap();
        let key = Value::date_from_timestamp_millis(946_684_800_000).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn get_on_unmapped_partition_is_none() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter);
        store.put(vec![entry(946_684_800, "x")]).await.unwrap();

        // 1999-12 has no file.
        let key = Value::date_from_timestamp_millis(946_000_000_000).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn multi_partition_put_fans_out() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter.clone());

        store
            .put(vec![
                entry(946_684_800, "2000-01-01"),
                entry(949_363_200, "2000-02-01"),
                entry(946_771_200, "2000-01-02"),
            ])
            .await
            .unwrap();

        assert_eq!(
            adapter.collection("csv").await.unwrap(),
            vec!["2000-01.csv", "2000-02.csv"]
        );
        assert_eq!(
            adapter.read("2000-01.csv").await.unwrap(),
            "timestamp,value\n946684800,2000-01-01\n946771200,2000-01-02\n"
        );
        assert_eq!(
            adapter.read("2000-02.csv").await.unwrap(),
            "timestamp,value\n949363200,2000-02-01\n"
        );
    }

    #[tokio::test]
    async fn first_last_and_key_projections() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter);

        store
            .put(vec![
                entry(946_684_800, "a"),
                entry(946_771_200, "b"),
                entry(949_363_200, "c"),
                entry(949_449_600, "d"),
            ])
            .await
            .unwrap();

        assert_eq!(store.first().await.unwrap(), Some(entry(946_684_800, "a")));
        assert_eq!(store.last().await.unwrap(), Some(entry(949_449_600, "d")));
        assert_eq!(
            store.first_key().await.unwrap(),
            Some(Value::date_from_timestamp_millis(946_684_800_000).unwrap())
        );
        assert_eq!(
            store.last_key().await.unwrap(),
            Some(Value::date_from_timestamp_millis(949_449_600_000).unwrap())
        );
    }

    #[tokio::test]
    async fn empty_store_answers_none() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter);

        assert_eq!(store.first().await.unwrap(), None);
        assert_eq!(store.last().await.unwrap(), None);
        assert_eq!(store.first_key().await.unwrap(), None);
        assert_eq!(store.last_key().await.unwrap(), None);
        let key = Value::date_from_timestamp_millis(0).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_put_is_a_noop() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter.clone());
        store.put(Vec::new()).await.unwrap();
        // Not even the schema is persisted.
        assert_eq!(adapter.collection("*").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn missing_schema_without_template() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = CsvStore::new(adapter, Arc::new(YearMonthPartitioner::new()));

        let err = store.fields().await.unwrap_err();
        assert!(matches!(err, CsvError::Core(CoreError::MissingSchema)));
        let err = store.put(vec![entry(0, "x")]).await.unwrap_err();
        assert!(matches!(err, CsvError::Core(CoreError::MissingSchema)));
    }

    #[tokio::test]
    async fn reopen_without_template_uses_stored_schema() {
        let adapter = Arc::new(MemoryStorage::new());
        let writer = store(adapter.clone());
        writer.put(vec![entry(946_684_800, "x")]).await.unwrap();

        let reader = CsvStore::new(adapter, Arc::new(YearMonthPartitioner::new()));
        assert_eq!(reader.fields().await.unwrap(), vec!["timestamp", "value"]);
        let key = Value::date_from_timestamp_millis(946_684_800_000).unwrap();
        assert_eq!(reader.get(&key).await.unwrap(), Some(entry(946_684_800, "x")));
    }

    #[tokio::test]
    async fn mismatched_template_fails_first_operation() {
        let adapter = Arc::new(MemoryStorage::new());
        let writer = store(adapter.clone());
        writer.put(vec![entry(946_684_800, "x")]).await.unwrap();

        let mismatched = CsvStore::with_template(
            adapter,
            Arc::new(YearMonthPartitioner::new()),
            timeline().field("additional", FieldKind::scalar(ScalarKind::String)),
        );
        let err = mismatched.fields().await.unwrap_err();
        assert!(matches!(
            err,
            CsvError::Core(CoreError::SchemaMismatched(_))
        ));
    }

    #[tokio::test]
    async fn validation_failure_surfaces_before_any_write() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = store(adapter.clone());

        let bad = Entry::new().with("timestamp", 12.0).with("value", "x");
        let err = store.put(vec![bad]).await.unwrap_err();
        assert!(matches!(err, CsvError::Core(CoreError::Validation { .. })));
        assert_eq!(adapter.collection("csv").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn concurrent_puts_to_one_partition_serialize() {
        let adapter = Arc::new(MemoryStorage::new());
        let store = Arc::new(store(adapter.clone()));

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put(vec![entry(946_684_800 + i, &format!("v{i}"))])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let text = adapter.read("2000-01.csv").await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 9); // header + 8 rows
        assert_eq!(lines[0], "timestamp,value");
        // All rows present and ascending by key.
        let keys: Vec<i64> = lines[1..]
            .iter()
            .map(|l| l.split(',').next().unwrap().parse().unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), 8);
    }
}
