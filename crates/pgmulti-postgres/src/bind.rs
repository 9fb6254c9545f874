//! Typed parameter binding.
//!
//! Parameters arrive as JSON. Each one is converted to the type the server
//! inferred for its placeholder when the statement was prepared, so that a
//! `null` fits an integer column and `"2024-01-02"` fits a date column.
//! Placeholders of types without a dedicated mapping receive the value's
//! text, which suits types whose binary input is their text (enums, xml,
//! citext). Other unmapped types are rejected by the server.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::types::{Decimal, Json};
use sqlx::{Postgres, TypeInfo};
use std::str::FromStr;
use uuid::Uuid;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Parameter types with a dedicated conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Bytea,
    BoolArray,
    Int4Array,
    Int8Array,
    Float8Array,
    NumericArray,
    TextArray,
    UuidArray,
}

impl ParamKind {
    /// Kind for a PostgreSQL type name; unknown names bind as text
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "BOOL" => ParamKind::Bool,
            "INT2" => ParamKind::Int2,
            "INT4" | "OID" => ParamKind::Int4,
            "INT8" => ParamKind::Int8,
            "FLOAT4" => ParamKind::Float4,
            "FLOAT8" => ParamKind::Float8,
            "NUMERIC" => ParamKind::Numeric,
            "JSON" | "JSONB" => ParamKind::Json,
            "UUID" => ParamKind::Uuid,
            "DATE" => ParamKind::Date,
            "TIME" => ParamKind::Time,
            "TIMESTAMP" => ParamKind::Timestamp,
            "TIMESTAMPTZ" => ParamKind::Timestamptz,
            "BYTEA" => ParamKind::Bytea,
            "BOOL[]" => ParamKind::BoolArray,
            "INT4[]" => ParamKind::Int4Array,
            "INT8[]" => ParamKind::Int8Array,
            "FLOAT8[]" => ParamKind::Float8Array,
            "NUMERIC[]" => ParamKind::NumericArray,
            "TEXT[]" => ParamKind::TextArray,
            "UUID[]" => ParamKind::UuidArray,
            _ => ParamKind::Text,
        }
    }

    /// Kind for a placeholder type reported by the server; domains bind as
    /// their base type
    pub fn from_type_info(type_info: &PgTypeInfo) -> Self {
        match type_info.kind() {
            PgTypeKind::Domain(base) => Self::from_type_info(base),
            _ => Self::from_type_name(type_info.name()),
        }
    }
}

/// A JSON value converted for one placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum PgParam {
    Null(ParamKind),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Text(String),
    Json(Value),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Timestamptz(DateTime<Utc>),
    Bytea(Vec<u8>),
    BoolArray(Vec<Option<bool>>),
    Int4Array(Vec<Option<i32>>),
    Int8Array(Vec<Option<i64>>),
    Float8Array(Vec<Option<f64>>),
    NumericArray(Vec<Option<Decimal>>),
    TextArray(Vec<Option<String>>),
    UuidArray(Vec<Option<Uuid>>),
}

impl PgParam {
    /// Convert `value` for a placeholder of the given kind
    ///
    /// The error names the value that could not be converted; the caller
    /// adds the placeholder position and type.
    pub fn convert(value: Value, kind: ParamKind) -> Result<Self, String> {
        if value.is_null() {
            return Ok(PgParam::Null(kind));
        }
        let mismatch = |value: &Value| format!("cannot convert {}", value);

        let param = match kind {
            ParamKind::Bool => to_bool(&value).map(PgParam::Bool),
            ParamKind::Int2 => to_i64(&value)
                .and_then(|n| i16::try_from(n).ok())
                .map(PgParam::Int2),
            ParamKind::Int4 => to_i64(&value)
                .and_then(|n| i32::try_from(n).ok())
                .map(PgParam::Int4),
            ParamKind::Int8 => to_i64(&value).map(PgParam::Int8),
            ParamKind::Float4 => to_f64(&value).map(|f| PgParam::Float4(f as f32)),
            ParamKind::Float8 => to_f64(&value).map(PgParam::Float8),
            ParamKind::Numeric => to_decimal(&value).map(PgParam::Numeric),
            ParamKind::Text => Some(PgParam::Text(to_text(&value))),
            ParamKind::Json => Some(PgParam::Json(to_json(value.clone()))),
            ParamKind::Uuid => to_uuid(&value).map(PgParam::Uuid),
            ParamKind::Date => value.as_str().and_then(parse_date).map(PgParam::Date),
            ParamKind::Time => value.as_str().and_then(parse_time).map(PgParam::Time),
            ParamKind::Timestamp => value
                .as_str()
                .and_then(parse_timestamp)
                .map(PgParam::Timestamp),
            ParamKind::Timestamptz => value
                .as_str()
                .and_then(parse_timestamptz)
                .map(PgParam::Timestamptz),
            ParamKind::Bytea => to_bytes(&value).map(PgParam::Bytea),
            ParamKind::BoolArray => to_array(&value, to_bool).map(PgParam::BoolArray),
            ParamKind::Int4Array => {
                to_array(&value, |v| to_i64(v).and_then(|n| i32::try_from(n).ok()))
                    .map(PgParam::Int4Array)
            }
            ParamKind::Int8Array => to_array(&value, to_i64).map(PgParam::Int8Array),
            ParamKind::Float8Array => to_array(&value, to_f64).map(PgParam::Float8Array),
            ParamKind::NumericArray => to_array(&value, to_decimal).map(PgParam::NumericArray),
            ParamKind::TextArray => {
                to_array(&value, |v| Some(to_text(v))).map(PgParam::TextArray)
            }
            ParamKind::UuidArray => to_array(&value, to_uuid).map(PgParam::UuidArray),
        };
        param.ok_or_else(|| mismatch(&value))
    }

    /// Add this parameter to a query
    pub fn bind(self, query: PgQuery<'_>) -> PgQuery<'_> {
        match self {
            PgParam::Null(kind) => bind_null(query, kind),
            PgParam::Bool(v) => query.bind(v),
            PgParam::Int2(v) => query.bind(v),
            PgParam::Int4(v) => query.bind(v),
            PgParam::Int8(v) => query.bind(v),
            PgParam::Float4(v) => query.bind(v),
            PgParam::Float8(v) => query.bind(v),
            PgParam::Numeric(v) => query.bind(v),
            PgParam::Text(v) => query.bind(v),
            PgParam::Json(v) => query.bind(Json(v)),
            PgParam::Uuid(v) => query.bind(v),
            PgParam::Date(v) => query.bind(v),
            PgParam::Time(v) => query.bind(v),
            PgParam::Timestamp(v) => query.bind(v),
            PgParam::Timestamptz(v) => query.bind(v),
            PgParam::Bytea(v) => query.bind(v),
            PgParam::BoolArray(v) => query.bind(v),
            PgParam::Int4Array(v) => query.bind(v),
            PgParam::Int8Array(v) => query.bind(v),
            PgParam::Float8Array(v) => query.bind(v),
            PgParam::NumericArray(v) => query.bind(v),
            PgParam::TextArray(v) => query.bind(v),
            PgParam::UuidArray(v) => query.bind(v),
        }
    }
}

fn bind_null(query: PgQuery<'_>, kind: ParamKind) -> PgQuery<'_> {
    match kind {
        ParamKind::Bool => query.bind(None::<bool>),
        ParamKind::Int2 => query.bind(None::<i16>),
        ParamKind::Int4 => query.bind(None::<i32>),
        ParamKind::Int8 => query.bind(None::<i64>),
        ParamKind::Float4 => query.bind(None::<f32>),
        ParamKind::Float8 => query.bind(None::<f64>),
        ParamKind::Numeric => query.bind(None::<Decimal>),
        ParamKind::Text => query.bind(None::<String>),
        ParamKind::Json => query.bind(None::<Json<Value>>),
        ParamKind::Uuid => query.bind(None::<Uuid>),
        ParamKind::Date => query.bind(None::<NaiveDate>),
        ParamKind::Time => query.bind(None::<NaiveTime>),
        ParamKind::Timestamp => query.bind(None::<NaiveDateTime>),
        ParamKind::Timestamptz => query.bind(None::<DateTime<Utc>>),
        ParamKind::Bytea => query.bind(None::<Vec<u8>>),
        ParamKind::BoolArray => query.bind(None::<Vec<Option<bool>>>),
        ParamKind::Int4Array => query.bind(None::<Vec<Option<i32>>>),
        ParamKind::Int8Array => query.bind(None::<Vec<Option<i64>>>),
        ParamKind::Float8Array => query.bind(None::<Vec<Option<f64>>>),
        ParamKind::NumericArray => query.bind(None::<Vec<Option<Decimal>>>),
        ParamKind::TextArray => query.bind(None::<Vec<Option<String>>>),
        ParamKind::UuidArray => query.bind(None::<Vec<Option<Uuid>>>),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        // the spellings PostgreSQL's boolean input accepts
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// A string holding a JSON document is stored as that document, as the
// server would parse it; any other string is stored as a JSON string.
fn to_json(value: Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

fn to_uuid(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok())
}

fn to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => match s.strip_prefix("\\x") {
            Some(hex) => decode_hex(hex),
            None => Some(s.as_bytes().to_vec()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn to_array<T>(value: &Value, item: impl Fn(&Value) -> Option<T>) -> Option<Vec<Option<T>>> {
    value
        .as_array()?
        .iter()
        .map(|v| if v.is_null() { Some(None) } else { item(v).map(Some) })
        .collect()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

// Like the server, a timestamp without time zone ignores any offset.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.naive_local())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// Values without an offset are taken as UTC.
fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(value: Value, type_name: &str) -> Result<PgParam, String> {
        PgParam::convert(value, ParamKind::from_type_name(type_name))
    }

    #[test]
    fn test_null_takes_placeholder_type() {
        assert_eq!(convert(Value::Null, "INT4"), Ok(PgParam::Null(ParamKind::Int4)));
        assert_eq!(convert(Value::Null, "DATE"), Ok(PgParam::Null(ParamKind::Date)));
        assert_eq!(convert(Value::Null, "mood"), Ok(PgParam::Null(ParamKind::Text)));
    }

    #[test]
    fn test_integers() {
        assert_eq!(convert(json!(5), "INT4"), Ok(PgParam::Int4(5)));
        assert_eq!(convert(json!("42"), "INT8"), Ok(PgParam::Int8(42)));
        assert_eq!(convert(json!(3.0), "INT2"), Ok(PgParam::Int2(3)));
        assert!(convert(json!(70000), "INT2").is_err());
        assert!(convert(json!(1.5), "INT4").is_err());
        assert!(convert(json!("abc"), "INT4").is_err());
    }

    #[test]
    fn test_floats_and_numeric() {
        assert_eq!(convert(json!(1.5), "FLOAT8"), Ok(PgParam::Float8(1.5)));
        assert_eq!(convert(json!("2.25"), "FLOAT4"), Ok(PgParam::Float4(2.25)));
        assert_eq!(
            convert(json!("12.50"), "NUMERIC"),
            Ok(PgParam::Numeric(Decimal::from_str("12.50").unwrap()))
        );
        assert_eq!(
            convert(json!(7), "NUMERIC"),
            Ok(PgParam::Numeric(Decimal::from(7)))
        );
        assert!(convert(json!("twelve"), "NUMERIC").is_err());
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(convert(json!(true), "BOOL"), Ok(PgParam::Bool(true)));
        assert_eq!(convert(json!("off"), "BOOL"), Ok(PgParam::Bool(false)));
        assert_eq!(convert(json!(1), "BOOL"), Ok(PgParam::Bool(true)));
        assert!(convert(json!("maybe"), "BOOL").is_err());
    }

    #[test]
    fn test_text_accepts_anything() {
        assert_eq!(convert(json!("x"), "TEXT"), Ok(PgParam::Text("x".to_string())));
        assert_eq!(convert(json!(5), "VARCHAR"), Ok(PgParam::Text("5".to_string())));
        assert_eq!(convert(json!("happy"), "mood"), Ok(PgParam::Text("happy".to_string())));
    }

    #[test]
    fn test_json() {
        assert_eq!(convert(json!({"a": 1}), "JSONB"), Ok(PgParam::Json(json!({"a": 1}))));
        assert_eq!(convert(json!("{\"a\":1}"), "JSON"), Ok(PgParam::Json(json!({"a": 1}))));
        assert_eq!(convert(json!("plain"), "JSONB"), Ok(PgParam::Json(json!("plain"))));
    }

    #[test]
    fn test_uuid() {
        let id = "5f2b8a4e-8c1d-4a8e-9f6b-1d2c3e4f5a6b";
        assert_eq!(
            convert(json!(id), "UUID"),
            Ok(PgParam::Uuid(Uuid::parse_str(id).unwrap()))
        );
        assert!(convert(json!("not-a-uuid"), "UUID").is_err());
    }

    #[test]
    fn test_dates_and_times() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(convert(json!("2024-01-02"), "DATE"), Ok(PgParam::Date(date)));
        assert_eq!(
            convert(json!("2024-01-02T10:00:00Z"), "DATE"),
            Ok(PgParam::Date(date))
        );
        assert_eq!(
            convert(json!("10:30"), "TIME"),
            Ok(PgParam::Time(NaiveTime::from_hms_opt(10, 30, 0).unwrap()))
        );
        assert_eq!(
            convert(json!("2024-01-02 03:04:05"), "TIMESTAMP"),
            Ok(PgParam::Timestamp(date.and_hms_opt(3, 4, 5).unwrap()))
        );
        assert_eq!(
            convert(json!("2024-01-02T03:04:05+02:00"), "TIMESTAMPTZ"),
            Ok(PgParam::Timestamptz(date.and_hms_opt(1, 4, 5).unwrap().and_utc()))
        );
        assert_eq!(
            convert(json!("2024-01-02T03:04:05"), "TIMESTAMPTZ"),
            Ok(PgParam::Timestamptz(date.and_hms_opt(3, 4, 5).unwrap().and_utc()))
        );
        assert!(convert(json!("yesterday"), "DATE").is_err());
        assert!(convert(json!(20240102), "DATE").is_err());
    }

    #[test]
    fn test_bytea() {
        assert_eq!(convert(json!("\\x00ff"), "BYTEA"), Ok(PgParam::Bytea(vec![0, 255])));
        assert_eq!(convert(json!([1, 2]), "BYTEA"), Ok(PgParam::Bytea(vec![1, 2])));
        assert_eq!(convert(json!("ab"), "BYTEA"), Ok(PgParam::Bytea(b"ab".to_vec())));
        assert!(convert(json!("\\xzz"), "BYTEA").is_err());
    }

    #[test]
    fn test_arrays() {
        assert_eq!(
            convert(json!([1, null, 3]), "INT4[]"),
            Ok(PgParam::Int4Array(vec![Some(1), None, Some(3)]))
        );
        assert_eq!(
            convert(json!(["a", 2]), "TEXT[]"),
            Ok(PgParam::TextArray(vec![Some("a".to_string()), Some("2".to_string())]))
        );
        assert_eq!(
            convert(json!(["1.5", 2]), "NUMERIC[]"),
            Ok(PgParam::NumericArray(vec![
                Some(Decimal::from_str("1.5").unwrap()),
                Some(Decimal::from(2)),
            ]))
        );
        assert!(convert(json!([1, "x"]), "INT8[]").is_err());
        assert!(convert(json!(1), "INT8[]").is_err());
    }
}
