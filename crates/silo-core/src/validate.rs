//! Entry validation against a resolved schema.
//!
//! Validation derives a type map from the concrete entry and compares it
//! structurally to the schema's map. The single relaxation: a nullable
//! field accepts either a present value of the declared kind or the
//! absent/null marker.

use std::collections::BTreeMap;

use crate::entry::Entry;
use crate::error::{CoreError, Result};
use crate::schema::{is_compliant_name, FieldDiff, FieldKind, Schema, SchemaDiff, ScalarKind};
use crate::value::Value;

/// The kind derived from one concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    Scalar(ScalarKind),
    /// A list; `None` when the list was empty and the element kind is
    /// unresolvable (such a list matches any declared list field).
    List(Option<ScalarKind>),
    Null,
}

impl DerivedKind {
    fn describe(&self) -> String {
        match self {
            DerivedKind::Scalar(k) => k.token().to_string(),
            DerivedKind::List(Some(k)) => format!("[{}]", k.token()),
            DerivedKind::List(None) => "[]".to_string(),
            DerivedKind::Null => "null".to_string(),
        }
    }

    fn matches(&self, expected: &FieldKind) -> bool {
        match self {
            DerivedKind::Scalar(k) => !expected.list && *k == expected.base,
            DerivedKind::List(None) => expected.list,
            DerivedKind::List(Some(k)) => expected.list && *k == expected.base,
            DerivedKind::Null => expected.nullable,
        }
    }
}

fn scalar_kind_of(value: &Value) -> Option<ScalarKind> {
    match value {
        Value::Bool(_) => Some(ScalarKind::Boolean),
        Value::Number(_) => Some(ScalarKind::Number),
        Value::String(_) => Some(ScalarKind::String),
        Value::Date(_) => Some(ScalarKind::Date),
        Value::Url(_) => Some(ScalarKind::Url),
        Value::Embedded(_) => Some(ScalarKind::Embedded),
        Value::List(_) | Value::Null => None,
    }
}

/// Derive the kind of a single value.
pub fn derive_kind(value: &Value) -> Result<DerivedKind> {
    match value {
        Value::Null => Ok(DerivedKind::Null),
        Value::List(items) => {
            let mut element = None;
            for item in items {
                let kind = scalar_kind_of(item).ok_or_else(|| {
                    CoreError::UnsupportedType(
                        "lists hold scalars only; nested lists and nulls are not storable"
                            .to_string(),
                    )
                })?;
                match element {
                    None => element = Some(kind),
                    Some(prev) if prev != kind => {
                        return Err(CoreError::UnsupportedType(format!(
                            "heterogeneous list: {} and {}",
                            prev.token(),
                            kind.token()
                        )))
                    }
                    Some(_) => {}
                }
            }
            Ok(DerivedKind::List(element))
        }
        other => Ok(DerivedKind::Scalar(
            scalar_kind_of(other).expect("scalar variants are exhaustive"),
        )),
    }
}

/// A type map derived from a concrete entry: field name to derived kind,
/// with no index marker.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMap {
    fields: BTreeMap<String, DerivedKind>,
}

impl TypeMap {
    /// Derive the type map of an entry.
    ///
    /// Fails with `NonCompliantKey` on a bad field name and with
    /// `UnsupportedType` on a value outside the closed union.
    pub fn of_entry(entry: &Entry) -> Result<Self> {
        let mut fields = BTreeMap::new();
        for (name, value) in entry.iter() {
            if !is_compliant_name(name) {
                return Err(CoreError::NonCompliantKey(name.to_string()));
            }
            fields.insert(name.to_string(), derive_kind(value)?);
        }
        Ok(Self { fields })
    }

    /// Look up a derived kind.
    pub fn get(&self, field: &str) -> Option<&DerivedKind> {
        self.fields.get(field)
    }

    /// Iterate over `(field, kind)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DerivedKind)> {
        self.fields.iter().map(|(n, k)| (n.as_str(), k))
    }
}

impl Schema {
    /// Validate an entry against this schema.
    pub fn validate(&self, entry: &Entry) -> Result<()> {
        let derived = TypeMap::of_entry(entry)?;
        let mut diff = SchemaDiff::default();

        for (name, expected) in self.fields() {
            match derived.get(name) {
                None if expected.nullable => {}
                None => diff.push(FieldDiff::Missing {
                    field: name.to_string(),
                    expected: expected.to_string(),
                }),
                Some(kind) if kind.matches(expected) => {}
                Some(kind) => diff.push(FieldDiff::Mismatched {
                    field: name.to_string(),
                    expected: expected.to_string(),
                    found: kind.describe(),
                }),
            }
        }
        for (name, kind) in derived.iter() {
            if self.field(name).is_none() {
                diff.push(FieldDiff::Unexpected {
                    field: name.to_string(),
                    found: kind.describe(),
                });
            }
        }

        if diff.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation {
                diff,
                entry: entry.clone(),
            })
        }
    }
}
