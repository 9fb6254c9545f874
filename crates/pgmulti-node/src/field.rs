//! Typed configuration fields.
//!
//! Each connection field of a database configuration entity carries a
//! field-type tag saying where its value comes from: the literal text,
//! a flow or global context variable, or an environment variable. Numeric
//! and boolean tags parse the literal text.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use pgmulti_core::{ContextScope, ContextStore, NodeError};

/// Where a configuration field's value comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// The literal text
    #[default]
    Str,
    /// The literal text parsed as an integer
    Num,
    /// The literal text parsed as a JSON boolean
    Bool,
    /// A flow context variable named by the text
    Flow,
    /// A global context variable named by the text
    Global,
    /// An environment variable named by the text
    Env,
}

impl From<&str> for FieldType {
    // unknown tags fall back to the literal value
    fn from(tag: &str) -> Self {
        match tag {
            "num" => FieldType::Num,
            "bool" => FieldType::Bool,
            "flow" => FieldType::Flow,
            "global" => FieldType::Global,
            "env" => FieldType::Env,
            _ => FieldType::Str,
        }
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = Option::<String>::deserialize(deserializer)?;
        Ok(tag.as_deref().map(FieldType::from).unwrap_or_default())
    }
}

impl FieldType {
    /// Resolve a raw field value
    ///
    /// Returns `Ok(None)` when a lookup finds nothing.
    pub fn resolve(&self, raw: &str, context: &dyn ContextStore) -> Result<Option<Value>, NodeError> {
        match self {
            FieldType::Str => Ok(Some(Value::String(raw.to_string()))),
            FieldType::Num => parse_leading_int(raw)
                .map(|n| Some(Value::Number(Number::from(n))))
                .ok_or_else(|| NodeError::Configuration(format!("'{}' is not a number", raw))),
            FieldType::Bool => serde_json::from_str::<bool>(raw.trim())
                .map(|b| Some(Value::Bool(b)))
                .map_err(|_| NodeError::Configuration(format!("'{}' is not a boolean", raw))),
            FieldType::Flow => Ok(context.get(ContextScope::Flow, raw)),
            FieldType::Global => Ok(context.get(ContextScope::Global, raw)),
            FieldType::Env => Ok(std::env::var(raw).ok().map(Value::String)),
        }
    }
}

/// Parse the integer at the start of `raw`, ignoring leading whitespace
/// and anything after the digits ("5432/tcp" is 5432)
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Render a resolved value as text; null and empty strings are absent
pub fn value_as_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Raw text of an entity field as stored in the flow definition
pub fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
