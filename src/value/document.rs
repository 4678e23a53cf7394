use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Number, Value as JsonValue};

use super::coerce::parse_datetime_text;
use super::literal::format_datetime;

/// One field value of a source document.
///
/// Explicit variants stand in for the loosely-typed values a document store
/// returns; every coercion pattern-matches over this union.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    /// Missing field or explicit null.
    Absent,
    /// Native store identifier, held as its hex text.
    ObjectId(String),
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    /// Store timestamp, UTC without offset.
    Timestamp(NaiveDateTime),
    Array(Vec<DocValue>),
    Object(Document),
}

static ABSENT: DocValue = DocValue::Absent;

impl DocValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, DocValue::Absent)
    }

    /// Decode a JSON value, honouring Mongo extended-JSON wrappers
    /// (`$oid`, `$date`, `$numberLong`, `$numberInt`, `$numberDouble`, `$numberDecimal`).
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => DocValue::Absent,
            JsonValue::Bool(b) => DocValue::Boolean(b),
            JsonValue::Number(n) => number_value(&n),
            JsonValue::String(s) => DocValue::String(s),
            JsonValue::Array(items) => {
                DocValue::Array(items.into_iter().map(DocValue::from_json).collect())
            }
            JsonValue::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = map.iter().next() {
                        if let Some(decoded) = extended_json(key, inner) {
                            return decoded;
                        }
                    }
                }
                DocValue::Object(Document::from_json_map(map))
            }
        }
    }

    /// Plain JSON rendering used for dead-letter payloads.
    pub fn to_json(&self) -> JsonValue {
        match self {
            DocValue::Absent => JsonValue::Null,
            DocValue::ObjectId(id) => JsonValue::String(id.clone()),
            DocValue::String(s) => JsonValue::String(s.clone()),
            DocValue::Integer(i) => JsonValue::Number((*i).into()),
            DocValue::Double(d) => Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DocValue::Boolean(b) => JsonValue::Bool(*b),
            DocValue::Timestamp(ts) => JsonValue::String(format_datetime(ts)),
            DocValue::Array(items) => JsonValue::Array(items.iter().map(DocValue::to_json).collect()),
            DocValue::Object(doc) => doc.to_json(),
        }
    }
}

fn number_value(n: &Number) -> DocValue {
    if let Some(i) = n.as_i64() {
        DocValue::Integer(i)
    } else {
        n.as_f64().map(DocValue::Double).unwrap_or(DocValue::Absent)
    }
}

fn extended_json(key: &str, inner: &JsonValue) -> Option<DocValue> {
    match (key, inner) {
        ("$oid", JsonValue::String(hex)) => Some(DocValue::ObjectId(hex.clone())),
        ("$date", JsonValue::String(text)) => parse_datetime_text(text).map(DocValue::Timestamp),
        ("$date", JsonValue::Number(ms)) => ms.as_i64().and_then(millis_to_timestamp),
        ("$date", JsonValue::Object(wrapped)) => wrapped
            .get("$numberLong")
            .and_then(JsonValue::as_str)
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(millis_to_timestamp),
        ("$numberLong" | "$numberInt", JsonValue::String(text)) => {
            text.trim().parse::<i64>().ok().map(DocValue::Integer)
        }
        ("$numberDouble" | "$numberDecimal", JsonValue::String(text)) => {
            let parsed = match text.trim() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other.parse::<f64>().ok()?,
            };
            Some(DocValue::Double(parsed))
        }
        _ => None,
    }
}

fn millis_to_timestamp(ms: i64) -> Option<DocValue> {
    DateTime::from_timestamp_millis(ms).map(|dt| DocValue::Timestamp(dt.naive_utc()))
}

/// An untyped field -> value record read from one source collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: BTreeMap<String, DocValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: DocValue) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: DocValue) -> Self {
        self.insert(field, value);
        self
    }

    /// Field value, `Absent` when missing.
    pub fn get(&self, field: &str) -> &DocValue {
        self.fields.get(field).unwrap_or(&ABSENT)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocValue)> {
        self.fields.iter()
    }

    pub fn from_json_map(map: Map<String, JsonValue>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, DocValue::from_json(v)))
                .collect(),
        }
    }

    /// Decode one JSON object (one NDJSON line). Non-objects are rejected.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(map) => Some(Self::from_json_map(map)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
