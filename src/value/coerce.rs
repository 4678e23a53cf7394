//! Readers that turn raw document values into schema-typed values.
//!
//! All readers return `None` for "absent": the caller omits the attribute
//! instead of writing a null placeholder.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use super::document::DocValue;
use super::literal::{format_datetime, Literal};
use crate::schema::ValueType;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Canonical string form of an opaque identifier.
pub fn normalize_id(value: &DocValue) -> Option<String> {
    match value {
        DocValue::ObjectId(hex) => non_empty(hex.trim()),
        DocValue::String(s) => non_empty(s.trim()),
        DocValue::Integer(i) => Some(i.to_string()),
        DocValue::Double(d) if d.is_finite() => Some(float_text(*d)),
        _ => None,
    }
}

pub fn as_string(value: &DocValue) -> Option<String> {
    match value {
        DocValue::String(s) => non_empty(s.trim()),
        _ => None,
    }
}

pub fn as_number(value: &DocValue) -> Option<f64> {
    let number = match value {
        DocValue::Integer(i) => *i as f64,
        DocValue::Double(d) => *d,
        DocValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Only a real boolean or the literal tokens "true"/"false" (any case).
pub fn as_boolean(value: &DocValue) -> Option<bool> {
    match value {
        DocValue::Boolean(b) => Some(*b),
        DocValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn as_datetime(value: &DocValue) -> Option<NaiveDateTime> {
    match value {
        DocValue::Timestamp(ts) => Some(*ts),
        DocValue::String(s) => parse_datetime_text(s),
        _ => None,
    }
}

/// Parse ISO-8601 text. Offsets are normalized to UTC and stripped;
/// a trailing `Z` counts as `+00:00`.
pub fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let normalized = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(head) => format!("{}+00:00", head),
        None => text.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.naive_utc());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.naive_utc());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Loose string reader used for `string` attributes and key components.
pub fn to_stringish(value: &DocValue) -> Option<String> {
    match value {
        DocValue::Absent => None,
        DocValue::ObjectId(hex) => non_empty(hex.trim()),
        DocValue::String(s) => non_empty(s.trim()),
        DocValue::Integer(i) => Some(i.to_string()),
        DocValue::Double(d) if d.is_finite() => Some(float_text(*d)),
        DocValue::Double(_) => None,
        DocValue::Boolean(b) => Some(b.to_string()),
        DocValue::Timestamp(ts) => Some(format_datetime(ts)),
        DocValue::Array(_) | DocValue::Object(_) => {
            // serde_json maps are ordered by key, so the output is key-sorted.
            let json: JsonValue = value.to_json();
            serde_json::to_string(&json).ok()
        }
    }
}

/// `active` / `inactive` from a boolean-ish flag, `unknown` otherwise.
pub fn status_from_bool(value: &DocValue) -> &'static str {
    match as_boolean(value) {
        Some(true) => "active",
        Some(false) => "inactive",
        None => "unknown",
    }
}

/// Convert a raw value into a literal of the attribute's declared type.
pub fn coerce(value: &DocValue, value_type: &ValueType) -> Option<Literal> {
    match value_type {
        ValueType::String => to_stringish(value).map(Literal::String),
        ValueType::Double => as_number(value).map(Literal::Double),
        ValueType::Integer => as_number(value).map(|n| Literal::Integer(n.trunc() as i64)),
        ValueType::Boolean => as_boolean(value).map(Literal::Boolean),
        ValueType::Datetime => as_datetime(value).map(Literal::Datetime),
        ValueType::Other(_) => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Float text that keeps a fractional marker for integral values (`1.0`).
fn float_text(d: f64) -> String {
    format!("{:?}", d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Document;

    fn s(text: &str) -> DocValue {
        DocValue::String(text.to_string())
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id(&DocValue::ObjectId("abc123".into())), Some("abc123".into()));
        assert_eq!(normalize_id(&s("  p1 ")), Some("p1".into()));
        assert_eq!(normalize_id(&s("   ")), None);
        assert_eq!(normalize_id(&DocValue::Integer(7)), Some("7".into()));
        assert_eq!(normalize_id(&DocValue::Double(1.5)), Some("1.5".into()));
        assert_eq!(normalize_id(&DocValue::Double(2.0)), Some("2.0".into()));
        assert_eq!(normalize_id(&DocValue::Boolean(true)), None);
        assert_eq!(normalize_id(&DocValue::Double(f64::NAN)), None);
        assert_eq!(normalize_id(&DocValue::Double(f64::INFINITY)), None);
        assert_eq!(normalize_id(&DocValue::Absent), None);
    }

    #[test]
    fn test_as_number_rejects_non_finite_and_booleans() {
        assert_eq!(as_number(&DocValue::Integer(3)), Some(3.0));
        assert_eq!(as_number(&s(" 2.5 ")), Some(2.5));
        assert_eq!(as_number(&s("NaN")), None);
        assert_eq!(as_number(&s("inf")), None);
        assert_eq!(as_number(&s("abc")), None);
        assert_eq!(as_number(&DocValue::Double(f64::NEG_INFINITY)), None);
        assert_eq!(as_number(&DocValue::Boolean(true)), None);
    }

    #[test]
    fn test_as_boolean_tokens_only() {
        assert_eq!(as_boolean(&DocValue::Boolean(false)), Some(false));
        assert_eq!(as_boolean(&s("TRUE")), Some(true));
        assert_eq!(as_boolean(&s(" False ")), Some(false));
        assert_eq!(as_boolean(&s("yes")), None);
        assert_eq!(as_boolean(&s("1")), None);
        assert_eq!(as_boolean(&DocValue::Integer(1)), None);
    }

    #[test]
    fn test_as_datetime_normalizes_offsets() {
        let utc = as_datetime(&s("2026-01-05T10:00:00Z")).unwrap();
        assert_eq!(format_datetime(&utc), "2026-01-05T10:00:00");

        let shifted = as_datetime(&s("2026-01-05T13:30:00+03:00")).unwrap();
        assert_eq!(format_datetime(&shifted), "2026-01-05T10:30:00");

        let naive = as_datetime(&s("2026-01-05T10:00:00.250")).unwrap();
        assert_eq!(format_datetime(&naive), "2026-01-05T10:00:00.250");

        let date_only = as_datetime(&s("2026-01-05")).unwrap();
        assert_eq!(format_datetime(&date_only), "2026-01-05T00:00:00");

        assert!(as_datetime(&s("not a date")).is_none());
        assert!(as_datetime(&DocValue::Integer(0)).is_none());
    }

    #[test]
    fn test_to_stringish() {
        assert_eq!(to_stringish(&DocValue::Boolean(true)), Some("true".into()));
        assert_eq!(to_stringish(&DocValue::Integer(-4)), Some("-4".into()));
        let nested = DocValue::Object(
            Document::new()
                .with("b", DocValue::Integer(2))
                .with("a", DocValue::Integer(1)),
        );
        assert_eq!(to_stringish(&nested), Some(r#"{"a":1,"b":2}"#.into()));
        assert_eq!(to_stringish(&DocValue::Absent), None);
    }

    #[test]
    fn test_status_from_bool() {
        assert_eq!(status_from_bool(&DocValue::Boolean(true)), "active");
        assert_eq!(status_from_bool(&s("false")), "inactive");
        assert_eq!(status_from_bool(&DocValue::Absent), "unknown");
    }

    #[test]
    fn test_coerce_dispatch() {
        assert_eq!(
            coerce(&DocValue::Double(3.9), &ValueType::Integer),
            Some(Literal::Integer(3))
        );
        assert_eq!(
            coerce(&DocValue::Double(-3.9), &ValueType::Integer),
            Some(Literal::Integer(-3))
        );
        assert_eq!(
            coerce(&s("true"), &ValueType::Boolean),
            Some(Literal::Boolean(true))
        );
        assert_eq!(coerce(&s("maybe"), &ValueType::Boolean), None);
        assert_eq!(coerce(&DocValue::Absent, &ValueType::String), None);
        assert_eq!(
            coerce(&DocValue::Integer(5), &ValueType::Other("decimal".into())),
            None
        );
    }
}
