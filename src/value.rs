//! Tagged value model and JSON coercion.
//!
//! Datastore-native leaf types (object ids, timestamps, arbitrary-precision
//! numerics) are captured as explicit [`Value`] cases so serialization is an
//! exhaustive match instead of runtime type introspection. Coercion to JSON
//! is pure, infallible and idempotent.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A datastore value in its canonical in-memory form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null; serialized as JSON `null`, never omitted.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision numeric (PostgreSQL `NUMERIC`).
    Decimal(Decimal),
    Str(String),
    /// UTC timestamp; serialized as an ISO-8601 string.
    Timestamp(DateTime<Utc>),
    /// Unique identifier (MongoDB ObjectId) in its canonical string form.
    Id(String),
    Map(BTreeMap<String, Value>),
    Seq(Vec<Value>),
}

impl Value {
    /// Coerce into a JSON-compatible value.
    ///
    /// Best-effort, no failure mode: identifiers become their string form,
    /// timestamps become ISO-8601 strings, decimals become a floating-point
    /// approximation, maps and sequences recurse.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Decimal(d) => serde_json::Value::from(d.to_f64().unwrap_or_default()),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Id(id) => serde_json::Value::String(id.clone()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Seq(seq) => serde_json::Value::Array(seq.iter().map(Value::to_json).collect()),
        }
    }

    /// Map entry helper for building record payloads.
    pub fn map(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl From<bson::Bson> for Value {
    fn from(b: bson::Bson) -> Self {
        match b {
            bson::Bson::Null | bson::Bson::Undefined => Self::Null,
            bson::Bson::Boolean(v) => Self::Bool(v),
            bson::Bson::Int32(v) => Self::Int(v.into()),
            bson::Bson::Int64(v) => Self::Int(v),
            bson::Bson::Double(v) => Self::Float(v),
            bson::Bson::String(v) => Self::Str(v),
            bson::Bson::DateTime(v) => Self::Timestamp(v.to_chrono()),
            bson::Bson::ObjectId(oid) => Self::Id(oid.to_hex()),
            bson::Bson::Document(doc) => Self::Map(
                doc.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
            bson::Bson::Array(arr) => Self::Seq(arr.into_iter().map(Value::from).collect()),
            // Unrecognized leaf types pass through via their relaxed JSON form.
            other => Value::from(other.into_relaxed_extjson()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(arr) => {
                Self::Seq(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_leaf_coercions() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            Value::Timestamp(ts).to_json(),
            serde_json::json!("2024-05-01T12:30:00Z")
        );
        assert_eq!(
            Value::Id("652f8a0c9d1e4b0001a2b3c4".into()).to_json(),
            serde_json::json!("652f8a0c9d1e4b0001a2b3c4")
        );
        assert_eq!(
            Value::Decimal(Decimal::new(1250, 2)).to_json(),
            serde_json::json!(12.5)
        );
    }

    #[test]
    fn test_null_stays_explicit() {
        let record = Value::map([("id", Value::Int(7)), ("created_at", Value::Null)]);
        let json = record.to_json();
        // The key must be present with an explicit null, not omitted.
        assert!(json.as_object().unwrap().contains_key("created_at"));
        assert_eq!(json["created_at"], serde_json::Value::Null);
    }

    #[test]
    fn test_nested_structures_recurse() {
        let value = Value::map([
            ("rows", Value::Seq(vec![Value::map([("n", Value::Int(1))])])),
            ("ok", Value::Bool(true)),
        ]);
        assert_eq!(
            value.to_json(),
            serde_json::json!({ "rows": [{ "n": 1 }], "ok": true })
        );
    }

    #[test]
    fn test_coercion_idempotent() {
        let ts = Utc.with_ymd_and_hms(2023, 11, 9, 8, 0, 45).unwrap();
        let value = Value::map([
            ("_id", Value::Id("0123456789abcdef01234567".into())),
            ("key", Value::Str("Zx9Qw1Ab2C".into())),
            ("createdAt", Value::Timestamp(ts)),
            ("amount", Value::Decimal(Decimal::new(9942, 2))),
            ("tags", Value::Seq(vec![Value::Null, Value::Float(1.5)])),
        ]);
        let once = value.to_json();
        let twice = Value::from(once.clone()).to_json();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_bson_conversion() {
        let oid = bson::oid::ObjectId::new();
        let doc = bson::doc! {
            "_id": oid,
            "key": "abc123XYZ0",
            "createdAt": bson::DateTime::from_millis(1_700_000_000_000),
            "n": 5_i32,
        };
        let value = Value::from(bson::Bson::Document(doc));
        let json = value.to_json();
        assert_eq!(json["_id"], serde_json::json!(oid.to_hex()));
        assert_eq!(json["key"], serde_json::json!("abc123XYZ0"));
        assert_eq!(json["n"], serde_json::json!(5));
        assert!(json["createdAt"].as_str().unwrap().starts_with("2023-11-14T"));
    }
}
