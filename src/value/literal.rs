use std::fmt;

use chrono::NaiveDateTime;

use crate::schema::ValueType;

/// A schema-typed value ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Double(f64),
    Integer(i64),
    Boolean(bool),
    Datetime(NaiveDateTime),
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::String(_) => ValueType::String,
            Literal::Double(_) => ValueType::Double,
            Literal::Integer(_) => ValueType::Integer,
            Literal::Boolean(_) => ValueType::Boolean,
            Literal::Datetime(_) => ValueType::Datetime,
        }
    }

    /// Unquoted storage form; equal values always produce equal text.
    pub fn canonical_text(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Double(d) => format_number_literal(*d),
            Literal::Integer(i) => i.to_string(),
            Literal::Boolean(b) => b.to_string(),
            Literal::Datetime(dt) => format_datetime(dt),
        }
    }
}

/// Query-language rendering (strings quoted and escaped).
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", escape_literal(s)),
            other => f.write_str(&other.canonical_text()),
        }
    }
}

pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Integral doubles render without a decimal point.
pub fn format_number_literal(value: f64) -> String {
    if value == 0.0 {
        // also folds -0.0
        return "0".to_string();
    }
    // f64 Display never uses exponent notation and drops a zero fraction.
    format!("{}", value)
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_literal("a\\b"), "a\\\\b");
        assert_eq!(escape_literal("l1\nl2\r\tx"), "l1\\nl2\\r\\tx");
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn test_format_number_literal() {
        assert_eq!(format_number_literal(3.0), "3");
        assert_eq!(format_number_literal(-12.0), "-12");
        assert_eq!(format_number_literal(2.5), "2.5");
        assert_eq!(format_number_literal(-0.0), "0");
        assert_eq!(format_number_literal(1e16), "10000000000000000");
    }

    #[test]
    fn test_display_quotes_strings_only() {
        assert_eq!(Literal::String("x\"y".into()).to_string(), "\"x\\\"y\"");
        assert_eq!(Literal::Double(4.0).to_string(), "4");
        assert_eq!(Literal::Integer(7).to_string(), "7");
        assert_eq!(Literal::Boolean(false).to_string(), "false");
        let dt = NaiveDateTime::parse_from_str("2026-01-05 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(Literal::Datetime(dt).to_string(), "2026-01-05T10:00:00");
    }
}
