//! Partitioners: pure mappings from index values to partition names.
//!
//! A partitioner never touches the storage adapter; it only names
//! partitions and orders the populated ones. Failure is permitted only
//! for key kinds the partitioner does not understand.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Utc};

use silo_core::{CoreError, Value};

/// The lexically-first and lexically-last populated partitions under a
/// partitioner's natural order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRange {
    pub first: String,
    pub last: String,
}

/// Maps index values to partition names and orders populated partitions.
pub trait Partitioner: Send + Sync {
    /// The partition a key belongs to. Pure; fails only on a key kind
    /// this partitioner does not cover.
    fn partition(&self, key: &Value) -> Result<String, CoreError>;

    /// The first and last populated partitions, or `None` when the input
    /// is empty. Names comparing equal under the natural order fall back
    /// to lexicographic order on the raw string.
    fn range(&self, names: &[String]) -> Option<PartitionRange>;
}

fn range_by(
    names: &[String],
    mut cmp: impl FnMut(&String, &String) -> Ordering,
) -> Option<PartitionRange> {
    let first = names.iter().min_by(|a, b| cmp(a, b))?;
    let last = names.iter().max_by(|a, b| cmp(a, b))?;
    Some(PartitionRange {
        first: first.clone(),
        last: last.clone(),
    })
}

/// Everything in one fixed partition.
#[derive(Debug, Clone)]
pub struct SinglePartitioner {
    name: String,
}

impl SinglePartitioner {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Partitioner for SinglePartitioner {
    fn partition(&self, _key: &Value) -> Result<String, CoreError> {
        Ok(self.name.clone())
    }

    fn range(&self, names: &[String]) -> Option<PartitionRange> {
        if names.is_empty() {
            return None;
        }
        Some(PartitionRange {
            first: self.name.clone(),
            last: self.name.clone(),
        })
    }
}

/// Fixed-size buckets over `Number` keys: key `i` maps to
/// `i - (i mod size)`, formatted as a decimal.
#[derive(Debug, Clone)]
pub struct FixedSizePartitioner {
    size: f64,
}

impl FixedSizePartitioner {
    pub fn new(size: f64) -> Self {
        Self { size }
    }
}

impl Partitioner for FixedSizePartitioner {
    fn partition(&self, key: &Value) -> Result<String, CoreError> {
        match key {
            Value::Number(n) => Ok((n - (n % self.size)).to_string()),
            other => Err(CoreError::UnsupportedType(format!(
                "fixed-size partitioner expects a Number key, got {other:?}"
            ))),
        }
    }

    fn range(&self, names: &[String]) -> Option<PartitionRange> {
        range_by(names, |a, b| {
            match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
                _ => a.cmp(b),
            }
        })
    }
}

/// Coercion from a non-`Date` key to an instant.
pub type DateCoercion = dyn Fn(&Value) -> Option<DateTime<Utc>> + Send + Sync;

/// One partition per UTC calendar month over `Date` keys: `"YYYY-MM"`.
///
/// A coercion closure supplied at construction extends coverage to other
/// key kinds (a `Number` of epoch seconds, a formatted `String`, ...).
pub struct YearMonthPartitioner {
    coerce: Option<Box<DateCoercion>>,
}

impl YearMonthPartitioner {
    pub fn new() -> Self {
        Self { coerce: None }
    }

    /// With a coercion for non-`Date` keys.
    pub fn with_coercion(
        coerce: impl Fn(&Value) -> Option<DateTime<Utc>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            coerce: Some(Box::new(coerce)),
        }
    }

    fn month_of(&self, key: &Value) -> Result<DateTime<Utc>, CoreError> {
        if let Value::Date(d) = key {
            return Ok(*d);
        }
        if let Some(coerce) = &self.coerce {
            if let Some(d) = coerce(key) {
                return Ok(d);
            }
        }
        Err(CoreError::UnsupportedType(format!(
            "year-month partitioner expects a Date key, got {key:?}"
        )))
    }
}

impl Default for YearMonthPartitioner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for YearMonthPartitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YearMonthPartitioner")
            .field("coerce", &self.coerce.as_ref().map(|_| "..."))
            .finish()
    }
}

fn parse_year_month(name: &str) -> Option<i64> {
    let (year, month) = name.rsplit_once('-')?;
    let year: i64 = year.parse().ok()?;
    let month: i64 = month.parse().ok()?;
    Some(year * 12 + month)
}

impl Partitioner for YearMonthPartitioner {
    fn partition(&self, key: &Value) -> Result<String, CoreError> {
        let d = self.month_of(key)?;
        Ok(format!("{:04}-{:02}", d.year(), d.month()))
    }

    fn range(&self, names: &[String]) -> Option<PartitionRange> {
        range_by(names, |a, b| {
            match (parse_year_month(a), parse_year_month(b)) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
                _ => a.cmp(b),
            }
        })
    }
}
