//! Per-backend value codecs.
//!
//! Each backend gets one hydrate/dehydrate pair. Hydration turns a typed
//! [`Value`] into the backend-native form; dehydration reverses it using
//! the field's declared kind. `dehydrate(kind, hydrate(v)) == v` for every
//! value conforming to the kind.

use crate::error::{CoreError, Result};
use crate::schema::{FieldKind, ScalarKind};
use crate::value::Value;

fn unsupported(detail: impl Into<String>) -> CoreError {
    CoreError::UnsupportedType(detail.into())
}

/// Textual encoding for the CSV backend.
///
/// Cells: `Boolean -> "0"|"1"`, `Number -> decimal`, `String -> verbatim`,
/// `Date -> seconds since epoch` (fractional permitted), `URL -> canonical
/// string`, `Embedded -> JSON`. Lists become a JSON array of
/// element-hydrated strings; a null cell is empty.
pub mod csv {
    use super::*;

    /// Encode one value as a CSV cell.
    pub fn hydrate(value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok(String::new()),
            Value::List(items) => {
                let cells = items
                    .iter()
                    .map(|item| match item {
                        Value::List(_) | Value::Null => Err(unsupported(
                            "lists hold scalars only; nested lists and nulls are not storable",
                        )),
                        scalar => hydrate(scalar),
                    })
                    .collect::<Result<Vec<String>>>()?;
                serde_json::to_string(&cells)
                    .map_err(|e| unsupported(format!("list cell encoding failed: {e}")))
            }
            scalar => hydrate_scalar(scalar),
        }
    }

    fn hydrate_scalar(value: &Value) -> Result<String> {
        match value {
            Value::Bool(false) => Ok("0".to_string()),
            Value::Bool(true) => Ok("1".to_string()),
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            Value::Date(d) => {
                let ms = d.timestamp_millis();
                if ms % 1000 == 0 {
                    Ok((ms / 1000).to_string())
                } else {
                    Ok((ms as f64 / 1000.0).to_string())
                }
            }
            Value::Url(u) => Ok(u.to_string()),
            Value::Embedded(map) => serde_json::to_string(map)
                .map_err(|e| unsupported(format!("embedded cell encoding failed: {e}"))),
            Value::List(_) | Value::Null => unreachable!("handled by hydrate"),
        }
    }

    /// Decode one CSV cell into a value of the declared kind.
    pub fn dehydrate(kind: &FieldKind, raw: &str) -> Result<Value> {
        if kind.nullable && raw.is_empty() {
            return Ok(Value::Null);
        }
        if kind.list {
            let cells: Vec<String> = serde_json::from_str(raw)
                .map_err(|e| unsupported(format!("list cell {raw:?} is not a JSON array: {e}")))?;
            let items = cells
                .iter()
                .map(|cell| dehydrate_scalar(kind.base, cell))
                .collect::<Result<Vec<Value>>>()?;
            return Ok(Value::List(items));
        }
        dehydrate_scalar(kind.base, raw)
    }

    fn dehydrate_scalar(base: ScalarKind, raw: &str) -> Result<Value> {
        match base {
            ScalarKind::Boolean => match raw {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                _ => Err(unsupported(format!("boolean cell {raw:?} is not 0 or 1"))),
            },
            ScalarKind::Number => raw
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|e| unsupported(format!("number cell {raw:?}: {e}"))),
            ScalarKind::String => Ok(Value::String(raw.to_string())),
            ScalarKind::Date => {
                let seconds: f64 = raw
                    .parse()
                    .map_err(|e| unsupported(format!("date cell {raw:?}: {e}")))?;
                let ms = (seconds * 1000.0).round() as i64;
                Value::date_from_timestamp_millis(ms)
                    .ok_or_else(|| unsupported(format!("date cell {raw:?} is out of range")))
            }
            ScalarKind::Url => url::Url::parse(raw)
                .map(Value::Url)
                .map_err(|e| unsupported(format!("url cell {raw:?}: {e}"))),
            ScalarKind::Embedded => match serde_json::from_str(raw) {
                Ok(serde_json::Value::Object(map)) => Ok(Value::Embedded(map)),
                Ok(_) => Err(unsupported(format!(
                    "embedded cell {raw:?} is not a JSON object"
                ))),
                Err(e) => Err(unsupported(format!("embedded cell {raw:?}: {e}"))),
            },
        }
    }
}

/// Native encoding for the relational backend.
///
/// Scalars map to SQLite-native forms: `Boolean -> 0|1` integer, `Date ->
/// milliseconds since epoch` integer, `Number -> real`, `String | URL |
/// Embedded -> text`. Lists are stored as JSON text even though scalar
/// columns are native.
pub mod sql {
    use super::*;

    /// The backend-native forms a relational column can hold.
    ///
    /// Kept free of any driver type so the core stays driver-agnostic.
    #[derive(Debug, Clone, PartialEq)]
    pub enum SqlValue {
        Integer(i64),
        Real(f64),
        Text(String),
        Null,
    }

    /// Encode one value for a relational column.
    pub fn hydrate(value: &Value) -> Result<SqlValue> {
        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) => Ok(SqlValue::Real(*n)),
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Date(d) => Ok(SqlValue::Integer(d.timestamp_millis())),
            Value::Url(u) => Ok(SqlValue::Text(u.to_string())),
            Value::Embedded(map) => serde_json::to_string(map)
                .map(SqlValue::Text)
                .map_err(|e| unsupported(format!("embedded column encoding failed: {e}"))),
            Value::List(items) => {
                let elements = items
                    .iter()
                    .map(element_to_json)
                    .collect::<Result<Vec<serde_json::Value>>>()?;
                serde_json::to_string(&elements)
                    .map(SqlValue::Text)
                    .map_err(|e| unsupported(format!("list column encoding failed: {e}")))
            }
        }
    }

    fn element_to_json(value: &Value) -> Result<serde_json::Value> {
        match value {
            Value::Bool(b) => Ok(serde_json::Value::from(i64::from(*b))),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| unsupported("non-finite number in list")),
            Value::String(s) => Ok(serde_json::Value::from(s.as_str())),
            Value::Date(d) => Ok(serde_json::Value::from(d.timestamp_millis())),
            Value::Url(u) => Ok(serde_json::Value::from(u.as_str())),
            Value::Embedded(map) => Ok(serde_json::Value::Object(map.clone())),
            Value::List(_) | Value::Null => Err(unsupported(
                "lists hold scalars only; nested lists and nulls are not storable",
            )),
        }
    }

    /// Decode one relational column into a value of the declared kind.
    pub fn dehydrate(kind: &FieldKind, value: &SqlValue) -> Result<Value> {
        if let SqlValue::Null = value {
            return if kind.nullable {
                Ok(Value::Null)
            } else {
                Err(unsupported("NULL column in a non-nullable field"))
            };
        }
        if kind.list {
            let SqlValue::Text(raw) = value else {
                return Err(unsupported(format!(
                    "list column holds {value:?}, expected JSON text"
                )));
            };
            let elements: Vec<serde_json::Value> = serde_json::from_str(raw)
                .map_err(|e| unsupported(format!("list column {raw:?}: {e}")))?;
            let items = elements
                .iter()
                .map(|e| element_from_json(kind.base, e))
                .collect::<Result<Vec<Value>>>()?;
            return Ok(Value::List(items));
        }
        dehydrate_scalar(kind.base, value)
    }

    fn element_from_json(base: ScalarKind, element: &serde_json::Value) -> Result<Value> {
        let mismatch = || unsupported(format!("list element {element} is not a {}", base.token()));
        match base {
            ScalarKind::Boolean => match element {
                serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            ScalarKind::Number => element.as_f64().map(Value::Number).ok_or_else(mismatch),
            ScalarKind::String => element
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            ScalarKind::Date => element
                .as_i64()
                .and_then(Value::date_from_timestamp_millis)
                .ok_or_else(mismatch),
            ScalarKind::Url => element
                .as_str()
                .and_then(|s| url::Url::parse(s).ok())
                .map(Value::Url)
                .ok_or_else(mismatch),
            ScalarKind::Embedded => element
                .as_object()
                .map(|m| Value::Embedded(m.clone()))
                .ok_or_else(mismatch),
        }
    }

    fn dehydrate_scalar(base: ScalarKind, value: &SqlValue) -> Result<Value> {
        let mismatch = || unsupported(format!("column holds {value:?}, expected {}", base.token()));
        match base {
            ScalarKind::Boolean => match value {
                SqlValue::Integer(0) => Ok(Value::Bool(false)),
                SqlValue::Integer(1) => Ok(Value::Bool(true)),
                _ => Err(mismatch()),
            },
            // NUMERIC affinity may hand back an integer for a whole number.
            ScalarKind::Number => match value {
                SqlValue::Integer(i) => Ok(Value::Number(*i as f64)),
                SqlValue::Real(r) => Ok(Value::Number(*r)),
                _ => Err(mismatch()),
            },
            ScalarKind::Date => {
                let ms = match value {
                    SqlValue::Integer(i) => *i,
                    SqlValue::Real(r) => r.round() as i64,
                    _ => return Err(mismatch()),
                };
                Value::date_from_timestamp_millis(ms).ok_or_else(mismatch)
            }
            ScalarKind::String => match value {
                SqlValue::Text(s) => Ok(Value::String(s.clone())),
                _ => Err(mismatch()),
            },
            ScalarKind::Url => match value {
                SqlValue::Text(s) => url::Url::parse(s)
                    .map(Value::Url)
                    .map_err(|e| unsupported(format!("url column {s:?}: {e}"))),
                _ => Err(mismatch()),
            },
            ScalarKind::Embedded => match value {
                SqlValue::Text(s) => match serde_json::from_str(s) {
                    Ok(serde_json::Value::Object(map)) => Ok(Value::Embedded(map)),
                    _ => Err(unsupported(format!(
                        "embedded column {s:?} is not a JSON object"
                    ))),
                },
                _ => Err(mismatch()),
            },
        }
    }
}
