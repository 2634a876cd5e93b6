//! Proptest generators for property-based testing.

use proptest::prelude::*;

use silo_core::{Entry, FieldKind, ScalarKind, Schema, Template, Value};

/// Generate a scalar kind.
pub fn scalar_kind() -> impl Strategy<Value = ScalarKind> {
    prop_oneof![
        Just(ScalarKind::Boolean),
        Just(ScalarKind::Number),
        Just(ScalarKind::String),
        Just(ScalarKind::Date),
        Just(ScalarKind::Url),
        Just(ScalarKind::Embedded),
    ]
}

/// Generate a key-capable scalar kind.
pub fn key_kind() -> impl Strategy<Value = ScalarKind> {
    prop_oneof![
        Just(ScalarKind::Number),
        Just(ScalarKind::String),
        Just(ScalarKind::Date),
        Just(ScalarKind::Url),
    ]
}

/// Generate a field kind triple.
pub fn field_kind() -> impl Strategy<Value = FieldKind> {
    (scalar_kind(), any::<bool>(), any::<bool>()).prop_map(|(base, list, nullable)| FieldKind {
        base,
        list,
        nullable,
    })
}

/// Generate a compliant field name.
pub fn field_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,11}".prop_map(String::from)
}

/// Generate a schema: a forced `id` index of a key kind plus a handful of
/// extra fields with unique names.
pub fn schema() -> impl Strategy<Value = Schema> {
    (
        key_kind(),
        prop::collection::btree_map(field_name(), field_kind(), 0..5),
    )
        .prop_map(|(index_kind, extras)| {
            let mut template = Template::new("id").field("id", FieldKind::scalar(index_kind));
            for (name, kind) in extras {
                if name != "id" {
                    template = template.field(name, kind);
                }
            }
            Schema::from_template(&template).expect("generated template is well-formed")
        })
}

/// Generate a scalar value of the given kind.
pub fn scalar_value(kind: ScalarKind) -> BoxedStrategy<Value> {
    match kind {
        ScalarKind::Boolean => any::<bool>().prop_map(Value::Bool).boxed(),
        ScalarKind::Number => (-1.0e12f64..1.0e12).prop_map(Value::Number).boxed(),
        // Non-empty: an empty string in a nullable column reads back as
        // null.
        ScalarKind::String => "[a-zA-Z0-9 ,._:-]{1,24}".prop_map(Value::from).boxed(),
        ScalarKind::Date => (0i64..4_000_000_000_000)
            .prop_map(|ms| Value::date_from_timestamp_millis(ms).unwrap())
            .boxed(),
        ScalarKind::Url => "[a-z0-9]{1,10}"
            .prop_map(|seg| {
                Value::Url(url::Url::parse(&format!("https://example.com/{seg}")).unwrap())
            })
            .boxed(),
        ScalarKind::Embedded => {
            prop::collection::btree_map("[a-z]{1,6}", -1000i64..1000, 0..4)
                .prop_map(|pairs| {
                    let mut map = serde_json::Map::new();
                    for (k, v) in pairs {
                        map.insert(k, serde_json::Value::from(v));
                    }
                    Value::Embedded(map)
                })
                .boxed()
        }
    }
}

/// Generate a value conforming to the given field kind (null included for
/// nullable fields).
pub fn value_for(kind: FieldKind) -> BoxedStrategy<Value> {
    let present = if kind.list {
        prop::collection::vec(scalar_value(kind.base), 0..4)
            .prop_map(Value::List)
            .boxed()
    } else {
        scalar_value(kind.base)
    };
    if kind.nullable {
        prop_oneof![3 => present, 1 => Just(Value::Null)].boxed()
    } else {
        present
    }
}

/// Generate an entry conforming to the given schema.
pub fn entry_for(schema: &Schema) -> BoxedStrategy<Entry> {
    let fields: Vec<(String, FieldKind)> = schema
        .fields()
        .map(|(n, k)| (n.to_string(), *k))
        .collect();
    let strategies: Vec<BoxedStrategy<(String, Value)>> = fields
        .into_iter()
        .map(|(name, kind)| {
            value_for(kind)
                .prop_map(move |v| (name.clone(), v))
                .boxed()
        })
        .collect();
    strategies
        .prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect::<Entry>()
        })
        .boxed()
}
