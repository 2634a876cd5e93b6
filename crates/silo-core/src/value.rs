//! The closed union of values a store can hold.
//!
//! Six scalar kinds plus the list and null modifiers are everything an
//! entry field may contain. The union is closed; backends pattern-match
//! it exhaustively.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Map;
use url::Url;

/// A single stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean flag.
    Bool(bool),
    /// An IEEE-754 double.
    Number(f64),
    /// An arbitrary UTF-8 string.
    String(String),
    /// An absolute instant with millisecond resolution.
    Date(DateTime<Utc>),
    /// An absolute URL.
    Url(Url),
    /// An arbitrary JSON-serializable mapping.
    Embedded(Map<String, serde_json::Value>),
    /// An ordered homogeneous sequence of scalars.
    List(Vec<Value>),
    /// The absent marker for nullable fields.
    Null,
}

impl Value {
    /// Build a `Date` value from milliseconds since the Unix epoch.
    ///
    /// Returns `None` for instants outside chrono's representable range.
    pub fn date_from_timestamp_millis(ms: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(ms).map(Value::Date)
    }

    /// Whether this is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Ordering between two key values of the same kind.
    ///
    /// Keys are `Number`, `String`, `Date` or `Url`; any other pairing
    /// (including mismatched kinds) has no defined order.
    pub fn cmp_key(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Some(a.total_cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Url(a), Value::Url(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Url> for Value {
    fn from(v: Url) -> Self {
        Value::Url(v)
    }
}

impl From<Map<String, serde_json::Value>> for Value {
    fn from(v: Map<String, serde_json::Value>) -> Self {
        Value::Embedded(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_from_millis_roundtrip() {
        let v = Value::date_from_timestamp_millis(946_684_800_000).unwrap();
        match v {
            Value::Date(d) => assert_eq!(d.timestamp_millis(), 946_684_800_000),
            other => panic!("expected Date, got {other:?}"),
        }
    }

    #[test]
    fn key_ordering_same_kind() {
        let a = Value::Number(1.0);
        let b = Value::Number(2.0);
        assert_eq!(a.cmp_key(&b), Some(Ordering::Less));

        let a = Value::String("alpha".into());
        let b = Value::String("beta".into());
        assert_eq!(a.cmp_key(&b), Some(Ordering::Less));
    }

    #[test]
    fn key_ordering_mismatched_kinds() {
        let a = Value::Number(1.0);
        let b = Value::String("1".into());
        assert_eq!(a.cmp_key(&b), None);
    }

    #[test]
    fn bool_is_not_a_key() {
        assert_eq!(Value::Bool(true).cmp_key(&Value::Bool(false)), None);
    }
}
