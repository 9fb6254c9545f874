//! Conversion of PostgreSQL rows into JSON objects.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::types::Decimal;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::net::IpAddr;
use tracing::debug;

use pgmulti_core::Row;

/// Convert a result row into a JSON object keyed by column name
///
/// Columns with the same name overwrite each other, last one wins.
pub fn row_to_json(row: &PgRow) -> Row {
    let mut object = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info());
        object.insert(column.name().to_string(), value);
    }
    object
}

fn decode_column(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Value {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw,
        Err(e) => {
            debug!(column = idx, error = %e, "Unreadable column");
            return Value::Null;
        }
    };

    // enum labels are sent as text in both formats
    if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
        return raw_text(&raw);
    }

    let type_name = type_info.name();
    let decoded: Result<Value, sqlx::Error> = match type_name {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::from),
        "INT2" => row.try_get::<i16, _>(idx).map(Value::from),
        "INT4" => row.try_get::<i32, _>(idx).map(Value::from),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| json!(v)),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(|v| json!(v)),
        // as strings so no precision is lost
        "NUMERIC" => row
            .try_get::<Decimal, _>(idx)
            .map(|v| Value::from(v.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "XML" | "UNKNOWN" => {
            Ok(raw_text(&raw))
        }
        name if name.eq_ignore_ascii_case("citext") => Ok(raw_text(&raw)),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx),
        "UUID" => row.try_get::<uuid::Uuid, _>(idx).map(|v| Value::from(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|v| Value::from(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|v| Value::from(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => row.try_get::<NaiveDate, _>(idx).map(|v| Value::from(v.to_string())),
        "TIME" => row.try_get::<NaiveTime, _>(idx).map(|v| Value::from(v.to_string())),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(idx)
            .map(|v| Value::from(format_interval(&v))),
        "INET" | "CIDR" if raw.format() == PgValueFormat::Binary => Ok(raw
            .as_bytes()
            .ok()
            .and_then(format_inet)
            .map_or(Value::Null, Value::from)),
        "BYTEA" => row.try_get::<Vec<u8>, _>(idx).map(Value::from),
        "BOOL[]" => row.try_get::<Vec<Option<bool>>, _>(idx).map(|v| json!(v)),
        "INT2[]" => row.try_get::<Vec<Option<i16>>, _>(idx).map(|v| json!(v)),
        "INT4[]" => row.try_get::<Vec<Option<i32>>, _>(idx).map(|v| json!(v)),
        "INT8[]" => row.try_get::<Vec<Option<i64>>, _>(idx).map(|v| json!(v)),
        "FLOAT8[]" => row.try_get::<Vec<Option<f64>>, _>(idx).map(|v| json!(v)),
        "NUMERIC[]" => row.try_get::<Vec<Option<Decimal>>, _>(idx).map(|v| {
            json!(v
                .iter()
                .map(|d| d.map(|d| d.to_string()))
                .collect::<Vec<_>>())
        }),
        "UUID[]" => row.try_get::<Vec<Option<uuid::Uuid>>, _>(idx).map(|v| {
            json!(v
                .iter()
                .map(|u| u.map(|u| u.to_string()))
                .collect::<Vec<_>>())
        }),
        "TEXT[]" | "VARCHAR[]" => row.try_get::<Vec<Option<String>>, _>(idx).map(|v| json!(v)),
        "VOID" => Ok(Value::Null),
        _ => Ok(decode_as_text(&raw, idx, type_name)),
    };

    decoded.unwrap_or_else(|e| {
        debug!(column = idx, type_name, error = %e, "Falling back to text decoding");
        decode_as_text(&raw, idx, type_name)
    })
}

fn raw_text(raw: &PgValueRef<'_>) -> Value {
    raw.as_str()
        .map_or(Value::Null, |text| Value::from(text.to_owned()))
}

// Values from the simple query protocol arrive as text, which covers
// types without a dedicated mapping. Binary values of such types have no
// portable rendering.
fn decode_as_text(raw: &PgValueRef<'_>, idx: usize, type_name: &str) -> Value {
    if raw.format() == PgValueFormat::Text {
        return raw_text(raw);
    }
    debug!(column = idx, type_name, "No JSON mapping for binary column, using null");
    Value::Null
}

/// Render an interval the way the server does with `IntervalStyle = postgres`
pub(crate) fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    // a positive part after a negative one is written with an explicit '+'
    let mut after_negative = false;

    let fields = [
        (i64::from(interval.months / 12), "year"),
        (i64::from(interval.months % 12), "mon"),
        (i64::from(interval.days), "day"),
    ];
    for (value, unit) in fields {
        if value == 0 {
            continue;
        }
        let sign = if after_negative && value > 0 { "+" } else { "" };
        let plural = if value == 1 { "" } else { "s" };
        parts.push(format!("{}{} {}{}", sign, value, unit, plural));
        after_negative = value < 0;
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 {
            "-"
        } else if after_negative {
            "+"
        } else {
            ""
        };
        let abs = micros.unsigned_abs();
        let hours = abs / 3_600_000_000;
        let minutes = abs / 60_000_000 % 60;
        let seconds = abs / 1_000_000 % 60;
        let fraction = abs % 1_000_000;

        let mut time = format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds);
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }

    parts.join(" ")
}

/// Render a binary `inet`/`cidr` value in the server's text form
///
/// The layout is family, prefix bits, cidr flag, address length, address.
pub(crate) fn format_inet(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 4 {
        return None;
    }
    let (header, addr) = bytes.split_at(4);
    if usize::from(header[3]) != addr.len() {
        return None;
    }

    let (ip, max_bits) = match header[0] {
        2 => (IpAddr::from(<[u8; 4]>::try_from(addr).ok()?), 32),
        3 => (IpAddr::from(<[u8; 16]>::try_from(addr).ok()?), 128),
        _ => return None,
    };

    let bits = header[1];
    let is_cidr = header[2] != 0;
    if !is_cidr && bits == max_bits {
        Some(ip.to_string())
    } else {
        Some(format!("{}/{}", ip, bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(months: i32, days: i32, microseconds: i64) -> String {
        format_interval(&PgInterval {
            months,
            days,
            microseconds,
        })
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(interval(0, 0, 0), "00:00:00");
        assert_eq!(
            interval(14, 3, ((4 * 60 + 5) * 60 + 6) * 1_000_000),
            "1 year 2 mons 3 days 04:05:06"
        );
        assert_eq!(interval(0, 1, 0), "1 day");
        assert_eq!(interval(0, -1, 0), "-1 days");
        assert_eq!(interval(-1, 1, 0), "-1 mons +1 day");
        assert_eq!(interval(0, 0, 1_500_000), "00:00:01.5");
        assert_eq!(interval(0, 2, -3_600_000_000), "2 days -01:00:00");
        assert_eq!(interval(0, 0, 30 * 3_600_000_000), "30:00:00");
    }

    #[test]
    fn test_format_inet() {
        assert_eq!(
            format_inet(&[2, 32, 0, 4, 192, 168, 0, 1]).as_deref(),
            Some("192.168.0.1")
        );
        assert_eq!(
            format_inet(&[2, 24, 0, 4, 192, 168, 0, 1]).as_deref(),
            Some("192.168.0.1/24")
        );
        assert_eq!(
            format_inet(&[2, 32, 1, 4, 10, 0, 0, 1]).as_deref(),
            Some("10.0.0.1/32")
        );

        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&[0; 15]);
        v6.push(1);
        assert_eq!(format_inet(&v6).as_deref(), Some("::1"));

        assert_eq!(format_inet(&[2, 32, 0, 4, 1, 2]), None);
        assert_eq!(format_inet(&[9, 32, 0, 4, 1, 2, 3, 4]), None);
    }
}
