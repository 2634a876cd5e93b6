//! Partition file framing: emitting and parsing header + rows.
//!
//! Values are hydrated per the core CSV codec; the `csv` crate handles
//! quoting, so embedded JSON and free-form strings survive the trip.

use silo_core::{codec, Entry, Schema, Value};
use silo_storage::StorageAdapter;

use crate::error::{CsvError, Result};

/// The file a partition lives in.
pub(crate) fn file_name(partition: &str) -> String {
    format!("{partition}.csv")
}

/// Render entries as CSV text, optionally preceded by the header row.
///
/// Columns follow schema declaration order; absent nullable fields emit
/// empty cells.
pub(crate) fn emit(schema: &Schema, entries: &[Entry], with_header: bool) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(schema.field_names())?;
    }
    for entry in entries {
        let mut record = Vec::with_capacity(schema.len());
        for (name, _) in schema.fields() {
            let value = entry.get(name).unwrap_or(&Value::Null);
            record.push(codec::csv::hydrate(value)?);
        }
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Malformed(format!("csv writer flush failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CsvError::Malformed(format!("non-UTF-8 output: {e}")))
}

/// Parse a header-first partition text into entries.
///
/// Null cells are dropped: the canonical form of an absent nullable value
/// is absence from the entry.
pub(crate) fn parse(schema: &Schema, text: &str) -> Result<Vec<Entry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let kinds = headers
        .iter()
        .map(|field| {
            schema
                .field(field)
                .map(|kind| (field.to_string(), *kind))
                .ok_or_else(|| {
                    CsvError::Malformed(format!("column {field:?} is not in the schema"))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut entry = Entry::new();
        for (i, (field, kind)) in kinds.iter().enumerate() {
            let raw = record.get(i).unwrap_or("");
            let value = codec::csv::dehydrate(kind, raw)?;
            if !value.is_null() {
                entry.set(field.clone(), value);
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// The first entry of a partition, reading exactly two lines.
pub(crate) async fn first_entry(
    adapter: &dyn StorageAdapter,
    schema: &Schema,
    path: &str,
) -> Result<Option<Entry>> {
    let text = adapter.head(path, 2).await?;
    Ok(parse(schema, &text)?.into_iter().next())
}

/// The last entry of a partition, reading one line from each end.
pub(crate) async fn last_entry(
    adapter: &dyn StorageAdapter,
    schema: &Schema,
    path: &str,
) -> Result<Option<Entry>> {
    let header = adapter.head(path, 1).await?;
    if adapter.size(path).await? == header.len() as u64 {
        // Header only: no entries.
        return Ok(None);
    }
    let tail = adapter.tail(path, 1).await?;
    let text = format!("{header}{tail}");
    Ok(parse(schema, &text)?.into_iter().next())
}
