//! Schemas, templates, and the textual schema grammar.
//!
//! A schema names every field of an entry, assigns each a `(base, list,
//! nullable)` triple, and designates exactly one field as the index. On
//! disk a schema is a JSON object mapping field names to grammar tokens:
//!
//! ```text
//! token := "*"? ("[" base "]" | base) "?"?
//! base  := "Boolean" | "Number" | "String" | "Date" | "URL" | "Embedded"
//! ```
//!
//! `*` marks the index, `[...]` a list, a trailing `?` a nullable field.
//! `*` and `?` are mutually exclusive.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map;

use crate::entry::Entry;
use crate::error::{CoreError, Result};
use crate::value::Value;

/// The six scalar kinds a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Boolean,
    Number,
    String,
    Date,
    Url,
    Embedded,
}

impl ScalarKind {
    /// The grammar spelling of this kind.
    pub fn token(&self) -> &'static str {
        match self {
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Number => "Number",
            ScalarKind::String => "String",
            ScalarKind::Date => "Date",
            ScalarKind::Url => "URL",
            ScalarKind::Embedded => "Embedded",
        }
    }

    /// Parse a grammar spelling.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Boolean" => Some(ScalarKind::Boolean),
            "Number" => Some(ScalarKind::Number),
            "String" => Some(ScalarKind::String),
            "Date" => Some(ScalarKind::Date),
            "URL" => Some(ScalarKind::Url),
            "Embedded" => Some(ScalarKind::Embedded),
            _ => None,
        }
    }

    /// Whether a field of this kind may carry the index marker.
    pub fn is_key_kind(&self) -> bool {
        matches!(
            self,
            ScalarKind::Number | ScalarKind::String | ScalarKind::Date | ScalarKind::Url
        )
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The `(base, list, nullable)` triple describing one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKind {
    pub base: ScalarKind,
    pub list: bool,
    pub nullable: bool,
}

impl FieldKind {
    /// A plain scalar field.
    pub const fn scalar(base: ScalarKind) -> Self {
        Self {
            base,
            list: false,
            nullable: false,
        }
    }

    /// A list of the given scalar.
    pub const fn list_of(base: ScalarKind) -> Self {
        Self {
            base,
            list: true,
            nullable: false,
        }
    }

    /// Mark the field nullable.
    pub const fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The grammar token for this triple, with or without the index marker.
    pub fn token(&self, index: bool) -> String {
        let mut out = String::new();
        if index {
            out.push('*');
        }
        if self.list {
            out.push('[');
            out.push_str(self.base.token());
            out.push(']');
        } else {
            out.push_str(self.base.token());
        }
        if self.nullable {
            out.push('?');
        }
        out
    }

    /// Parse a grammar token into a triple plus its index marker.
    pub fn from_grammar(field: &str, token: &str) -> Result<(Self, bool)> {
        let undetermined = |reason: &str| CoreError::TypeUndetermined {
            field: field.to_string(),
            reason: format!("{reason} in token {token:?}"),
        };

        let mut rest = token;
        let index = if let Some(stripped) = rest.strip_prefix('*') {
            rest = stripped;
            true
        } else {
            false
        };
        let nullable = if let Some(stripped) = rest.strip_suffix('?') {
            rest = stripped;
            true
        } else {
            false
        };
        if index && nullable {
            return Err(undetermined("index and nullable markers are exclusive"));
        }

        let (base_token, list) = match rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            Some(inner) => (inner, true),
            None => (rest, false),
        };
        if index && list {
            return Err(undetermined("index field cannot be a list"));
        }

        let base = ScalarKind::from_token(base_token)
            .ok_or_else(|| undetermined("unknown base kind"))?;
        if index && !base.is_key_kind() {
            return Err(undetermined("index kind must be Number, String, Date or URL"));
        }

        Ok((Self { base, list, nullable }, index))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token(false))
    }
}

/// Field names must match `[A-Za-z0-9_]+`.
pub fn is_compliant_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// A user-declared description of the entries a store will hold.
///
/// This is the explicit schema description value: it names the index
/// field and lists every field with its kind and modifiers. Stores accept
/// a template at construction and reconcile it against any persisted
/// schema on first use.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    index: String,
    fields: Vec<(String, FieldKind)>,
}

impl Template {
    /// Start a template naming the index field.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push((name.into(), kind));
        self
    }

    /// The declared index field name.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The declared fields, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(n, k)| (n.as_str(), k))
    }
}

/// One field-level difference between two schemas (or between a schema
/// and a derived type map).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDiff {
    Missing {
        field: String,
        expected: String,
    },
    Unexpected {
        field: String,
        found: String,
    },
    Mismatched {
        field: String,
        expected: String,
        found: String,
    },
    IndexMoved {
        expected: String,
        found: String,
    },
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDiff::Missing { field, expected } => {
                write!(f, "  - {field}: expected {expected}, missing")
            }
            FieldDiff::Unexpected { field, found } => {
                write!(f, "  - {field}: unexpected ({found})")
            }
            FieldDiff::Mismatched {
                field,
                expected,
                found,
            } => write!(f, "  - {field}: expected {expected}, found {found}"),
            FieldDiff::IndexMoved { expected, found } => {
                write!(f, "  - index: expected {expected}, found {found}")
            }
        }
    }
}

/// A structural diff suitable for diagnostic rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDiff {
    pub fields: Vec<FieldDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn push(&mut self, diff: FieldDiff) {
        self.fields.push(diff);
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.fields.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

/// The resolved, immutable shape of a store's entries.
///
/// Holds the index field name and every field's triple in declaration
/// order. A store resolves exactly one schema for its lifetime.
#[derive(Debug, Clone)]
pub struct Schema {
    index: String,
    fields: Vec<(String, FieldKind)>,
}

impl Schema {
    /// Derive a schema from a declared template.
    pub fn from_template(template: &Template) -> Result<Self> {
        let mut fields = Vec::new();
        let mut index_kind = None;
        for (name, kind) in template.fields() {
            if !is_compliant_name(name) {
                return Err(CoreError::NonCompliantKey(name.to_string()));
            }
            if name == template.index() {
                index_kind = Some(*kind);
            }
            fields.push((name.to_string(), *kind));
        }

        let undetermined = |reason: &str| CoreError::TypeUndetermined {
            field: template.index().to_string(),
            reason: reason.to_string(),
        };
        let kind = index_kind.ok_or_else(|| undetermined("index field is not declared"))?;
        if !kind.base.is_key_kind() {
            return Err(undetermined("index kind must be Number, String, Date or URL"));
        }
        if kind.list {
            return Err(undetermined("index field cannot be a list"));
        }
        if kind.nullable {
            return Err(undetermined("index field cannot be nullable"));
        }

        Ok(Self {
            index: template.index().to_string(),
            fields,
        })
    }

    /// Encode to the on-disk grammar map, keys in declaration order.
    pub fn encode(&self) -> Map<String, serde_json::Value> {
        let mut out = Map::new();
        for (name, kind) in &self.fields {
            let token = kind.token(name == &self.index);
            out.insert(name.clone(), serde_json::Value::String(token));
        }
        out
    }

    /// Decode a grammar map back into a schema.
    pub fn decode(map: &Map<String, serde_json::Value>) -> Result<Self> {
        let mut index = None;
        let mut fields = Vec::new();
        for (name, token) in map {
            if !is_compliant_name(name) {
                return Err(CoreError::NonCompliantKey(name.clone()));
            }
            let token = token.as_str().ok_or_else(|| CoreError::TypeUndetermined {
                field: name.clone(),
                reason: "grammar token is not a string".to_string(),
            })?;
            let (kind, is_index) = FieldKind::from_grammar(name, token)?;
            if is_index {
                if let Some(prev) = index.replace(name.clone()) {
                    return Err(CoreError::TypeUndetermined {
                        field: name.clone(),
                        reason: format!("second index marker; {prev:?} is already the index"),
                    });
                }
            }
            fields.push((name.clone(), kind));
        }
        let index = index.ok_or(CoreError::MissingSchema)?;
        Ok(Self { index, fields })
    }

    /// The index field name.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The index field's kind triple.
    pub fn index_kind(&self) -> &FieldKind {
        self.field(&self.index)
            .expect("schema invariant: index field is always declared")
    }

    /// Look up one field's triple.
    pub fn field(&self, name: &str) -> Option<&FieldKind> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, k)| k)
    }

    /// All fields, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(n, k)| (n.as_str(), k))
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The key value of an entry under this schema.
    pub fn key_of<'e>(&self, entry: &'e Entry) -> Option<&'e Value> {
        entry.get(&self.index)
    }

    /// Structural comparison; `None` means the schemas are equal.
    ///
    /// Equality is order-insensitive over the field set plus the index
    /// name. `self` is the expected side of the rendered diff.
    pub fn diff(&self, other: &Schema) -> Option<SchemaDiff> {
        let mut diff = SchemaDiff::default();
        if self.index != other.index {
            diff.push(FieldDiff::IndexMoved {
                expected: self.index.clone(),
                found: other.index.clone(),
            });
        }

        let expected: BTreeMap<&str, &FieldKind> =
            self.fields.iter().map(|(n, k)| (n.as_str(), k)).collect();
        let found: BTreeMap<&str, &FieldKind> =
            other.fields.iter().map(|(n, k)| (n.as_str(), k)).collect();

        for (name, kind) in &expected {
            match found.get(name) {
                None => diff.push(FieldDiff::Missing {
                    field: name.to_string(),
                    expected: kind.to_string(),
                }),
                Some(other_kind) if other_kind != kind => diff.push(FieldDiff::Mismatched {
                    field: name.to_string(),
                    expected: kind.to_string(),
                    found: other_kind.to_string(),
                }),
                Some(_) => {}
            }
        }
        for (name, kind) in &found {
            if !expected.contains_key(name) {
                diff.push(FieldDiff::Unexpected {
                    field: name.to_string(),
                    found: kind.to_string(),
                });
            }
        }

        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.diff(other).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> Template {
        Template::new("timestamp")
            .field("timestamp", FieldKind::scalar(ScalarKind::Date))
            .field("value", FieldKind::scalar(ScalarKind::String))
    }

    #[test]
    fn template_derivation() {
        let schema = Schema::from_template(&timeline()).unwrap();
        assert_eq!(schema.index(), "timestamp");
        assert_eq!(schema.field_names(), vec!["timestamp", "value"]);
    }

    #[test]
    fn grammar_tokens() {
        assert_eq!(FieldKind::scalar(ScalarKind::Date).token(true), "*Date");
        assert_eq!(FieldKind::list_of(ScalarKind::Url).token(false), "[URL]");
        assert_eq!(
            FieldKind::scalar(ScalarKind::Number).optional().token(false),
            "Number?"
        );
    }

    #[test]
    fn encode_decode_identity() {
        let schema = Schema::from_template(
            &Template::new("id")
                .field("id", FieldKind::scalar(ScalarKind::Number))
                .field("tags", FieldKind::list_of(ScalarKind::String))
                .field("note", FieldKind::scalar(ScalarKind::String).optional())
                .field("payload", FieldKind::scalar(ScalarKind::Embedded)),
        )
        .unwrap();

        let encoded = schema.encode();
        assert_eq!(encoded["id"], "*Number");
        assert_eq!(encoded["tags"], "[String]");
        assert_eq!(encoded["note"], "String?");

        let decoded = Schema::decode(&encoded).unwrap();
        assert_eq!(decoded, schema);
        // Declaration order survives the round trip.
        assert_eq!(decoded.field_names(), schema.field_names());
    }

    #[test]
    fn decode_rejects_index_nullable_combination() {
        let mut map = Map::new();
        map.insert("id".into(), serde_json::Value::String("*Number?".into()));
        let err = Schema::decode(&map).unwrap_err();
        assert!(matches!(err, CoreError::TypeUndetermined { .. }));
    }

    #[test]
    fn decode_rejects_unknown_base() {
        let mut map = Map::new();
        map.insert("id".into(), serde_json::Value::String("*Integer".into()));
        let err = Schema::decode(&map).unwrap_err();
        assert!(matches!(err, CoreError::TypeUndetermined { .. }));
    }

    #[test]
    fn decode_without_index_is_missing_schema() {
        let mut map = Map::new();
        map.insert("id".into(), serde_json::Value::String("Number".into()));
        let err = Schema::decode(&map).unwrap_err();
        assert!(matches!(err, CoreError::MissingSchema));
    }

    #[test]
    fn index_must_be_declared() {
        let template = Template::new("id").field("name", FieldKind::scalar(ScalarKind::String));
        let err = Schema::from_template(&template).unwrap_err();
        assert!(matches!(err, CoreError::TypeUndetermined { field, .. } if field == "id"));
    }

    #[test]
    fn index_must_be_a_key_kind() {
        let template =
            Template::new("flag").field("flag", FieldKind::scalar(ScalarKind::Boolean));
        let err = Schema::from_template(&template).unwrap_err();
        assert!(matches!(err, CoreError::TypeUndetermined { .. }));
    }

    #[test]
    fn non_compliant_field_name_rejected() {
        let template = Template::new("id")
            .field("id", FieldKind::scalar(ScalarKind::Number))
            .field("bad name", FieldKind::scalar(ScalarKind::String));
        let err = Schema::from_template(&template).unwrap_err();
        assert!(matches!(err, CoreError::NonCompliantKey(name) if name == "bad name"));
    }

    #[test]
    fn equality_is_order_insensitive() {
        let a = Schema::from_template(
            &Template::new("id")
                .field("id", FieldKind::scalar(ScalarKind::Number))
                .field("name", FieldKind::scalar(ScalarKind::String)),
        )
        .unwrap();
        let b = Schema::from_template(
            &Template::new("id")
                .field("name", FieldKind::scalar(ScalarKind::String))
                .field("id", FieldKind::scalar(ScalarKind::Number)),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn diff_reports_field_level_changes() {
        let stored = Schema::from_template(&timeline()).unwrap();
        let declared = Schema::from_template(
            &Template::new("timestamp")
                .field("timestamp", FieldKind::scalar(ScalarKind::Date))
                .field("value", FieldKind::scalar(ScalarKind::String))
                .field("additional", FieldKind::scalar(ScalarKind::String)),
        )
        .unwrap();

        let diff = declared.diff(&stored).unwrap();
        assert_eq!(diff.fields.len(), 1);
        assert!(matches!(
            &diff.fields[0],
            FieldDiff::Missing { field, .. } if field == "additional"
        ));
    }
}
