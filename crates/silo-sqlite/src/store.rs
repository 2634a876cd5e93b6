//! The indexed relational store over an embedded SQLite file.
//!
//! Two tables back a store: `schema` holds exactly one row of grammar
//! tokens (one TEXT column per field), and `records` holds one column per
//! field with NUMERIC affinity for Boolean/Number/Date and TEXT otherwise,
//! keyed by `PRIMARY KEY(<index>)`. Connections are opened per task and
//! closed on every exit path; writes are serialized by a store-level
//! single-slot queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::{Mutex, OnceCell};

use silo_core::{codec, CoreError, Entry, EntryStore, FieldKind, Schema, SqlValue, Template, Value};

use crate::error::{Result, SqliteError};

/// SQLite's default bound-parameter cap; inserts are chunked under it.
const MAX_PARAMS: usize = 999;

/// A store over a single SQLite database file.
///
/// Duplicate keys: inserts carry `ON CONFLICT DO NOTHING`, so the
/// *earlier* value wins and later writes with the same index are silently
/// ignored.
pub struct SqliteStore {
    path: PathBuf,
    template: Option<Template>,
    schema: OnceCell<Arc<Schema>>,
    write_slot: Mutex<()>,
}

impl SqliteStore {
    /// Open a store over an existing database; the schema must already be
    /// stored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            template: None,
            schema: OnceCell::new(),
            write_slot: Mutex::new(()),
        }
    }

    /// Open a store with a declared template; both tables are created
    /// atomically on first use if the database is fresh.
    pub fn open_with_template(path: impl Into<PathBuf>, template: Template) -> Self {
        Self {
            template: Some(template),
            ..Self::open(path)
        }
    }

    /// Resolve (and cache) the store's schema.
    async fn schema(&self) -> Result<Arc<Schema>> {
        self.schema
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let template = self.template.clone();
                let schema = tokio::task::spawn_blocking(move || {
                    let mut conn = open_db(&path)?;
                    resolve_schema(&mut conn, template.as_ref())
                })
                .await
                .map_err(join_error)??;
                Ok(Arc::new(schema))
            })
            .await
            .cloned()
    }

    async fn boundary(&self, order: &'static str) -> Result<Option<Entry>> {
        let schema = self.schema().await?;
        let path = self.path.clone();
        let query_schema = schema.clone();
        let columns = tokio::task::spawn_blocking(move || -> Result<Option<Vec<SqlValue>>> {
            let conn = open_db(&path)?;
            let sql = format!(
                "SELECT {} FROM records ORDER BY {} {} LIMIT 1",
                select_list(&query_schema),
                quote(query_schema.index()),
                order,
            );
            let row = conn
                .query_row(&sql, [], |row| read_columns(&query_schema, row))
                .optional()?;
            Ok(row)
        })
        .await
        .map_err(join_error)??;

        columns.map(|cols| entry_from_columns(&schema, &cols)).transpose()
    }
}

fn join_error(e: tokio::task::JoinError) -> SqliteError {
    SqliteError::Task(e.to_string())
}

/// Statement trace sink; every executed statement is observable at trace
/// level.
fn trace_sql(statement: &str) {
    tracing::trace!(target: "silo_sqlite::sql", "{statement}");
}

fn open_db(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    conn.trace(Some(trace_sql));
    Ok(conn)
}

fn quote(identifier: &str) -> String {
    // Field names are pre-validated to [A-Za-z0-9_]+; quoting guards
    // against SQL keywords among them.
    format!("\"{identifier}\"")
}

fn select_list(schema: &Schema) -> String {
    schema
        .fields()
        .map(|(name, _)| quote(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column affinity per kind: NUMERIC for native scalars stored as
/// numbers, TEXT otherwise. Lists are JSON text regardless of element
/// kind.
fn affinity(kind: &FieldKind) -> &'static str {
    use silo_core::ScalarKind::*;
    if kind.list {
        return "TEXT";
    }
    match kind.base {
        Boolean | Number | Date => "NUMERIC",
        String | Url | Embedded => "TEXT",
    }
}

fn resolve_schema(conn: &mut Connection, template: Option<&Template>) -> Result<Schema> {
    let stored = read_stored_schema(conn)?;
    let declared = template.map(Schema::from_template).transpose()?;
    match (stored, declared) {
        (None, None) => Err(CoreError::MissingSchema.into()),
        (Some(stored), None) => Ok(stored),
        (None, Some(declared)) => {
            create_tables(conn, &declared)?;
            Ok(declared)
        }
        (Some(stored), Some(declared)) => match declared.diff(&stored) {
            Some(diff) => Err(CoreError::SchemaMismatched(diff).into()),
            None => Ok(stored),
        },
    }
}

fn read_stored_schema(conn: &Connection) -> Result<Option<Schema>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT * FROM schema")?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([])?;
    let Some(row) = rows.next()? else {
        return Err(SqliteError::Malformed(
            "schema table exists but holds no row".to_string(),
        ));
    };

    let mut map = serde_json::Map::new();
    for (i, name) in names.iter().enumerate() {
        let token: String = row.get(i)?;
        map.insert(name.clone(), serde_json::Value::String(token));
    }
    Ok(Some(Schema::decode(&map)?))
}

/// First-contact initialization: both tables in one transaction.
fn create_tables(conn: &mut Connection, schema: &Schema) -> Result<()> {
    let tx = conn.transaction()?;

    let token_columns = schema
        .fields()
        .map(|(name, _)| format!("{} TEXT", quote(name)))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(&format!("CREATE TABLE schema ({token_columns})"), [])?;

    let names = select_list(schema);
    let placeholders = (1..=schema.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let tokens: Vec<String> = schema
        .encode()
        .values()
        .map(|token| token.as_str().unwrap_or_default().to_string())
        .collect();
    tx.execute(
        &format!("INSERT INTO schema ({names}) VALUES ({placeholders})"),
        rusqlite::params_from_iter(tokens),
    )?;

    let record_columns = schema
        .fields()
        .map(|(name, kind)| format!("{} {}", quote(name), affinity(kind)))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!(
            "CREATE TABLE records ({record_columns}, PRIMARY KEY ({}))",
            quote(schema.index())
        ),
        [],
    )?;

    tx.commit()?;
    tracing::debug!("initialized schema and records tables");
    Ok(())
}

fn to_db_value(value: &SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Integer(i) => rusqlite::types::Value::Integer(*i),
        SqlValue::Real(r) => rusqlite::types::Value::Real(*r),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
        SqlValue::Null => rusqlite::types::Value::Null,
    }
}

/// Read one row's columns in schema order.
fn read_columns(schema: &Schema, row: &rusqlite::Row<'_>) -> rusqlite::Result<Vec<SqlValue>> {
    use rusqlite::types::ValueRef;
    let mut out = Vec::with_capacity(schema.len());
    for i in 0..schema.len() {
        out.push(match row.get_ref(i)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => {
                return Err(rusqlite::Error::InvalidColumnType(
                    i,
                    "unexpected BLOB column".to_string(),
                    rusqlite::types::Type::Blob,
                ))
            }
        });
    }
    Ok(out)
}

/// Dehydrate one row into an entry; NULL columns are dropped (absence is
/// the canonical form of a nullable value).
fn entry_from_columns(schema: &Schema, columns: &[SqlValue]) -> Result<Entry> {
    let mut entry = Entry::new();
    for ((name, kind), column) in schema.fields().zip(columns) {
        let value = codec::sql::dehydrate(kind, column)?;
        if !value.is_null() {
            entry.set(name, value);
        }
    }
    Ok(entry)
}

/// Rows per multi-row INSERT for a schema of `field_count` columns.
fn rows_per_statement(field_count: usize) -> usize {
    MAX_PARAMS / field_count
}

fn insert_rows(
    path: &Path,
    schema: &Schema,
    rows: Vec<Vec<rusqlite::types::Value>>,
) -> Result<()> {
    let conn = open_db(path)?;
    let names = select_list(schema);
    let row_tuple = format!(
        "({})",
        vec!["?"; schema.len()].join(", ")
    );

    for chunk in rows.chunks(rows_per_statement(schema.len())) {
        let values = vec![row_tuple.as_str(); chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO records ({names}) VALUES {values} ON CONFLICT DO NOTHING"
        );
        let inserted = conn.execute(&sql, rusqlite::params_from_iter(chunk.iter().flatten()))?;
        tracing::debug!(rows = chunk.len(), inserted, "insert chunk");
    }
    Ok(())
}

#[async_trait]
impl EntryStore for SqliteStore {
    type Error = SqliteError;

    async fn fields(&self) -> Result<Vec<String>> {
        Ok(self.schema().await?.field_names())
    }

    async fn first(&self) -> Result<Option<Entry>> {
        self.boundary("ASC").await
    }

    async fn last(&self) -> Result<Option<Entry>> {
        self.boundary("DESC").await
    }

    async fn first_key(&self) -> Result<Option<Value>> {
        let schema = self.schema().await?;
        Ok(self
            .first()
            .await?
            .and_then(|e| e.get(schema.index()).cloned()))
    }

    async fn last_key(&self) -> Result<Option<Value>> {
        let schema = self.schema().await?;
        Ok(self
            .last()
            .await?
            .and_then(|e| e.get(schema.index()).cloned()))
    }

    async fn get(&self, key: &Value) -> Result<Option<Entry>> {
        let schema = self.schema().await?;
        let key_column = to_db_value(&codec::sql::hydrate(key)?);

        let path = self.path.clone();
        let query_schema = schema.clone();
        let columns = tokio::task::spawn_blocking(move || -> Result<Option<Vec<SqlValue>>> {
            let conn = open_db(&path)?;
            let sql = format!(
                "SELECT {} FROM records WHERE {} = ?1",
                select_list(&query_schema),
                quote(query_schema.index()),
            );
            let row = conn
                .query_row(&sql, rusqlite::params![key_column], |row| {
                    read_columns(&query_schema, row)
                })
                .optional()?;
            Ok(row)
        })
        .await
        .map_err(join_error)??;

        columns.map(|cols| entry_from_columns(&schema, &cols)).transpose()
    }

    async fn put(&self, entries: Vec<Entry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        // Single-slot FIFO: one put task runs against the database at a
        // time, independent of call concurrency.
        let _slot = self.write_slot.lock().await;

        let schema = self.schema().await?;
        for entry in &entries {
            schema.validate(entry)?;
        }

        let mut rows = Vec::with_capacity(entries.len());
        for entry in &entries {
            let mut row = Vec::with_capacity(schema.len());
            for (name, _) in schema.fields() {
                let value = entry.get(name).unwrap_or(&Value::Null);
                row.push(to_db_value(&codec::sql::hydrate(value)?));
            }
            rows.push(row);
        }

        let path = self.path.clone();
        let insert_schema = schema.clone();
        tokio::task::spawn_blocking(move || insert_rows(&path, &insert_schema, rows))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::ScalarKind;
    use tempfile::TempDir;

    fn timeline() -> Template {
        Template::new("timestamp")
            .field("timestamp", FieldKind::scalar(ScalarKind::Date))
            .field("value", FieldKind::scalar(ScalarKind::String))
    }

    fn entry(ms: i64, value: &str) -> Entry {
        Entry::new()
            .with("timestamp", Value::date_from_timestamp_millis(ms).unwrap())
            .with("value", value)
    }

    fn store(dir: &TempDir) -> SqliteStore {
        SqliteStore::open_with_template(dir.path().join("store.db"), timeline())
    }

    #[test]
    fn chunk_arithmetic_matches_parameter_cap() {
        // Two fields: 499 rows per statement, 65535 rows need 132.
        assert_eq!(rows_per_statement(2), 499);
        assert_eq!(65_535usize.div_ceil(rows_per_statement(2)), 132);
        // A wide schema still stays under the cap.
        assert_eq!(rows_per_statement(10) * 10, 990);
    }

    #[tokio::test]
    async fn read_your_writes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let e = entry(946_684_800_000, "2000-01-01");

        store.put(vec![e.clone()]).await.unwrap();
        let key = Value::date_from_timestamp_millis(946_684_800_000).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn duplicate_key_keeps_earlier_value() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put(vec![entry(1_000, "first")]).await.unwrap();
        store.put(vec![entry(1_000, "second")]).await.unwrap();

        let key = Value::date_from_timestamp_millis(1_000).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(entry(1_000, "first")));
    }

    #[tokio::test]
    async fn duplicate_within_one_batch_keeps_earlier() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .put(vec![entry(1_000, "first"), entry(1_000, "second")])
            .await
            .unwrap();
        let key = Value::date_from_timestamp_millis(1_000).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(entry(1_000, "first")));
    }

    #[tokio::test]
    async fn boundaries_and_key_projections() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .put(vec![entry(3_000, "c"), entry(1_000, "a"), entry(2_000, "b")])
            .await
            .unwrap();

        assert_eq!(store.first().await.unwrap(), Some(entry(1_000, "a")));
        assert_eq!(store.last().await.unwrap(), Some(entry(3_000, "c")));
        assert_eq!(
            store.first_key().await.unwrap(),
            Some(Value::date_from_timestamp_millis(1_000).unwrap())
        );
        assert_eq!(
            store.last_key().await.unwrap(),
            Some(Value::date_from_timestamp_millis(3_000).unwrap())
        );
    }

    #[tokio::test]
    async fn empty_store_answers_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(store.first().await.unwrap(), None);
        assert_eq!(store.last().await.unwrap(), None);
        assert_eq!(store.first_key().await.unwrap(), None);
        assert_eq!(store.last_key().await.unwrap(), None);
        let key = Value::date_from_timestamp_millis(0).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_schema_without_template() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db"));

        let err = store.fields().await.unwrap_err();
        assert!(matches!(err, SqliteError::Core(CoreError::MissingSchema)));
    }

    #[tokio::test]
    async fn reopen_without_template_uses_stored_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let writer = SqliteStore::open_with_template(&path, timeline());
        writer.put(vec![entry(1_000, "x")]).await.unwrap();

        let reader = SqliteStore::open(&path);
        assert_eq!(reader.fields().await.unwrap(), vec!["timestamp", "value"]);
        let key = Value::date_from_timestamp_millis(1_000).unwrap();
        assert_eq!(reader.get(&key).await.unwrap(), Some(entry(1_000, "x")));
    }

    #[tokio::test]
    async fn mismatched_template_fails_first_operation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let writer = SqliteStore::open_with_template(&path, timeline());
        writer.put(vec![entry(1_000, "x")]).await.unwrap();

        let mismatched = SqliteStore::open_with_template(
            &path,
            timeline().field("additional", FieldKind::scalar(ScalarKind::String)),
        );
        let err = mismatched.fields().await.unwrap_err();
        assert!(matches!(
            err,
            SqliteError::Core(CoreError::SchemaMismatched(_))
        ));
    }

    #[tokio::test]
    async fn chunked_bulk_insert_in_one_call() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        // Three chunks at 499 rows per statement.
        let entries: Vec<Entry> = (0..1_200)
            .map(|i| entry(i * 1_000, &format!("v{i}")))
            .collect();
        store.put(entries).await.unwrap();

        assert_eq!(store.first().await.unwrap(), Some(entry(0, "v0")));
        assert_eq!(
            store.last().await.unwrap(),
            Some(entry(1_199_000, "v1199"))
        );
        let key = Value::date_from_timestamp_millis(777_000).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(entry(777_000, "v777")));
    }

    #[tokio::test]
    async fn nullable_and_list_columns_roundtrip() {
        let dir = TempDir::new().unwrap();
        let template = Template::new("id")
            .field("id", FieldKind::scalar(ScalarKind::Number))
            .field("tags", FieldKind::list_of(ScalarKind::String))
            .field("note", FieldKind::scalar(ScalarKind::String).optional());
        let store = SqliteStore::open_with_template(dir.path().join("store.db"), template);

        let with_note = Entry::new()
            .with("id", 1.0)
            .with("tags", vec![Value::String("a".into()), Value::String("b".into())])
            .with("note", "kept");
        let without_note = Entry::new()
            .with("id", 2.0)
            .with("tags", Vec::<Value>::new());
        store
            .put(vec![with_note.clone(), without_note.clone()])
            .await
            .unwrap();

        assert_eq!(store.get(&Value::Number(1.0)).await.unwrap(), Some(with_note));
        assert_eq!(
            store.get(&Value::Number(2.0)).await.unwrap(),
            Some(without_note)
        );
    }

    #[tokio::test]
    async fn concurrent_puts_serialize() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(vec![entry(i * 1_000, &format!("v{i}"))]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.first().await.unwrap(), Some(entry(0, "v0")));
        assert_eq!(store.last().await.unwrap(), Some(entry(7_000, "v7")));
    }
}
