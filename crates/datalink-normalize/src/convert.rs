//! Value-level conversions used by the normalizer

use crate::error::{NormalizeError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

const NAIVE_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const NAIVE_INPUT_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Type family a declared SQL type converts into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Boolean,
    Integer,
    Float,
    Timestamp,
    Date,
    Text,
    Passthrough,
}

impl TargetKind {
    /// Classify a declared type such as `VARCHAR(255)` or `double precision`
    pub fn of(declared: &str) -> Self {
        let upper = declared.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "BOOLEAN" | "BOOL" | "BIT" => TargetKind::Boolean,
            "INTEGER" | "INT" | "INT2" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "TINYINT"
            | "MEDIUMINT" | "SERIAL" | "BIGSERIAL" | "YEAR" => TargetKind::Integer,
            "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "NUMERIC"
            | "DECIMAL" => TargetKind::Float,
            "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATETIME2" | "SMALLDATETIME"
            | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITHOUT TIME ZONE" => TargetKind::Timestamp,
            "DATE" => TargetKind::Date,
            "VARCHAR" | "CHARACTER VARYING" | "CHAR" | "CHARACTER" | "TEXT" | "STRING"
            | "NVARCHAR" | "NCHAR" | "CLOB" => TargetKind::Text,
            _ => TargetKind::Passthrough,
        }
    }
}

/// Convert `value` toward `declared`. Values that cannot be converted are returned unchanged.
pub fn convert_value(value: &Value, declared: &str) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let converted = match TargetKind::of(declared) {
        TargetKind::Boolean => to_boolean(value),
        TargetKind::Integer => to_integer(value),
        TargetKind::Float => to_float(value),
        TargetKind::Timestamp => to_timestamp(value),
        TargetKind::Date => to_date(value),
        TargetKind::Text => to_text(value),
        TargetKind::Passthrough => None,
    };
    converted.unwrap_or_else(|| value.clone())
}

fn to_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" => Some(Value::Bool(true)),
            "0" | "false" | "f" | "no" | "n" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::Number(Number::from(f as i64))),
        Value::Bool(b) => Some(Value::Number(Number::from(*b as i64))),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into())),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    Number::from_f64(f).map(Value::Number)
}

/// Normalize a timestamp to ISO-8601.
///
/// Offsets are preserved for RFC 3339 input, naive values stay naive, epoch numbers become UTC.
fn to_timestamp(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => parse_timestamp(s).map(Value::String),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|dt| Value::String(dt.to_rfc3339())),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    for format in NAIVE_INPUT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.format(NAIVE_OUTPUT_FORMAT).to_string());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.format(NAIVE_OUTPUT_FORMAT).to_string())
}

fn to_date(value: &Value) -> Option<Value> {
    let s = value.as_str()?.trim();
    let prefix = s.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
}

fn to_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(Value::String(value.to_string()))
        }
        Value::Null => None,
    }
}

/// Target character repertoires understood by `normalize_encoding`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEncoding {
    Utf8,
    Ascii,
    Latin1,
}

impl TargetEncoding {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TargetEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(TargetEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TargetEncoding::Latin1),
            other => Err(NormalizeError::UnsupportedEncoding(other.to_string())),
        }
    }

    fn keeps(&self, c: char) -> bool {
        match self {
            TargetEncoding::Utf8 => c != '\0',
            TargetEncoding::Ascii => c.is_ascii() && c != '\0',
            TargetEncoding::Latin1 => (c as u32) <= 0xFF && c != '\0',
        }
    }
}

/// Drop characters the target repertoire cannot hold, recursing into arrays and objects
pub fn encode_value(value: &Value, encoding: TargetEncoding) -> Value {
    match value {
        Value::String(s) => Value::String(s.chars().filter(|c| encoding.keeps(*c)).collect()),
        Value::Array(items) => Value::Array(items.iter().map(|v| encode_value(v, encoding)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode_value(v, encoding)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_kind_classification() {
        assert_eq!(TargetKind::of("TINYINT(1)"), TargetKind::Integer);
        assert_eq!(TargetKind::of("boolean"), TargetKind::Boolean);
        assert_eq!(TargetKind::of("character varying(64)"), TargetKind::Text);
        assert_eq!(TargetKind::of("timestamp without time zone"), TargetKind::Timestamp);
        assert_eq!(TargetKind::of("GEOMETRY"), TargetKind::Passthrough);
    }

    #[test]
    fn test_boolean_conversion() {
        assert_eq!(convert_value(&json!(1), "BOOLEAN"), json!(true));
        assert_eq!(convert_value(&json!(0), "BOOLEAN"), json!(false));
        assert_eq!(convert_value(&json!("yes"), "BOOLEAN"), json!(true));
        assert_eq!(convert_value(&json!("maybe"), "BOOLEAN"), json!("maybe"));
        assert_eq!(convert_value(&Value::Null, "BOOLEAN"), Value::Null);
    }

    #[test]
    fn test_timestamp_conversion_is_idempotent() {
        let once = convert_value(&json!("2024-03-01 10:20:30"), "TIMESTAMP");
        assert_eq!(once, json!("2024-03-01T10:20:30"));
        assert_eq!(convert_value(&once, "TIMESTAMP"), once);

        let zoned = convert_value(&json!("2024-03-01T10:20:30+02:00"), "TIMESTAMP");
        assert_eq!(zoned, json!("2024-03-01T10:20:30+02:00"));
        assert_eq!(convert_value(&zoned, "TIMESTAMP"), zoned);
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(convert_value(&json!("42"), "INTEGER"), json!(42));
        assert_eq!(convert_value(&json!(3.0), "BIGINT"), json!(3));
        assert_eq!(convert_value(&json!(3.5), "INTEGER"), json!(3.5));
        assert_eq!(convert_value(&json!("2.5"), "DOUBLE"), json!(2.5));
        assert_eq!(convert_value(&json!(7), "TEXT"), json!("7"));
        assert_eq!(convert_value(&json!("2024-03-01T10:00:00"), "DATE"), json!("2024-03-01"));
    }

    #[test]
    fn test_encoding() {
        let value = json!({"name": "Zoë\u{0}", "tags": ["naïve", "ok"]});
        assert_eq!(
            encode_value(&value, TargetEncoding::Ascii),
            json!({"name": "Zo", "tags": ["nave", "ok"]})
        );
        assert_eq!(
            encode_value(&value, TargetEncoding::Utf8),
            json!({"name": "Zoë", "tags": ["naïve", "ok"]})
        );
        assert_eq!(
            encode_value(&json!("snow ☃"), TargetEncoding::Latin1),
            json!("snow ")
        );
        assert!(TargetEncoding::parse("ebcdic").is_err());
        assert_eq!(TargetEncoding::parse("UTF_8").unwrap(), TargetEncoding::Utf8);
    }
}
