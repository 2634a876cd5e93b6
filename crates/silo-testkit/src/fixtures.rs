//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: the timeline template used
//! throughout the suite, entry builders, and a ready-made CSV store over
//! in-memory storage.

use std::sync::Arc;

use silo_core::{Entry, FieldKind, ScalarKind, Template, Value};
use silo_csv::CsvStore;
use silo_storage::{MemoryStorage, YearMonthPartitioner};

/// The `{timestamp: *Date, value: String}` template.
pub fn timeline_template() -> Template {
    Template::new("timestamp")
        .field("timestamp", FieldKind::scalar(ScalarKind::Date))
        .field("value", FieldKind::scalar(ScalarKind::String))
}

/// A `{id: *Number, label: String}` template for numeric partitioning.
pub fn numeric_template() -> Template {
    Template::new("id")
        .field("id", FieldKind::scalar(ScalarKind::Number))
        .field("label", FieldKind::scalar(ScalarKind::String))
}

/// A timeline entry at the given epoch seconds.
pub fn reading(secs: i64, value: &str) -> Entry {
    Entry::new()
        .with("timestamp", date_at(secs))
        .with("value", value)
}

/// A `Date` key at the given epoch seconds.
pub fn date_at(secs: i64) -> Value {
    Value::date_from_timestamp_millis(secs * 1000).expect("test instant in range")
}

/// A CSV store over in-memory storage with the timeline template.
pub struct CsvFixture {
    pub adapter: Arc<MemoryStorage>,
    pub store: CsvStore,
}

impl CsvFixture {
    /// A fresh fixture: year-month partitioning, timeline template.
    pub fn new() -> Self {
        let adapter = Arc::new(MemoryStorage::new());
        let store = CsvStore::with_template(
            adapter.clone(),
            Arc::new(YearMonthPartitioner::new()),
            timeline_template(),
        );
        Self { adapter, store }
    }

    /// A fixture without a template, over existing storage.
    pub fn reopen(adapter: Arc<MemoryStorage>) -> Self {
        let store = CsvStore::new(adapter.clone(), Arc::new(YearMonthPartitioner::new()));
        Self { adapter, store }
    }
}

impl Default for CsvFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::EntryStore;

    #[tokio::test]
    async fn fixture_stores_and_reads() {
        let fixture = CsvFixture::new();
        fixture
            .store
            .put(vec![reading(946_684_800, "x")])
            .await
            .unwrap();
        assert_eq!(
            fixture.store.get(&date_at(946_684_800)).await.unwrap(),
            Some(reading(946_684_800, "x"))
        );
    }
}
