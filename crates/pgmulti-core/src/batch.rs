//! Batch data model: query specifications, per-query outcomes and the
//! summary attached to the outbound message.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{NodeError, StatementError};
use crate::types::{json_type_name, Message};

/// Name of the message field carrying the per-query outcome list
pub const QUERY_COUNTS_FIELD: &str = "_queryCounts";

/// Outcome value recorded for a failed query
pub const FAILURE_SENTINEL: i64 = -1;

/// Validation message for a payload that is not an array
pub const PAYLOAD_NOT_ARRAY: &str = "payload must be an array of queries";

/// A single result row, keyed by column name
pub type Row = Map<String, Value>;

/// Parameters bound to one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParams {
    /// Bound by position, `$1`, `$2`, ...
    Positional(Vec<Value>),
    /// Bound by name, `$name`
    Named(Map<String, Value>),
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams::Named(Map::new())
    }
}

impl QueryParams {
    /// Whether no parameter values are supplied
    pub fn is_empty(&self) -> bool {
        match self {
            QueryParams::Positional(values) => values.is_empty(),
            QueryParams::Named(map) => map.is_empty(),
        }
    }
}

/// One element of the inbound batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// SQL text
    #[serde(alias = "query")]
    pub sql: String,

    /// Parameters; absent or null means none
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: QueryParams,

    /// Whether the rows of this query belong in the outbound payload
    #[serde(default, rename = "output", deserialize_with = "truthy")]
    pub wants_output: bool,
}

impl QuerySpec {
    /// A query without parameters whose rows are not collected
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: QueryParams::default(),
            wants_output: false,
        }
    }

    /// Set the parameters
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Set whether rows are collected
    pub fn with_output(mut self, wants_output: bool) -> Self {
        self.wants_output = wants_output;
        self
    }

    /// Interpret one batch element
    ///
    /// A malformed element only fails its own position in the batch, so the
    /// error is a statement error rather than a validation error.
    pub fn from_value(value: &Value) -> Result<Self, StatementError> {
        if !value.is_object() {
            return Err(StatementError::new(format!(
                "invalid query specification: expected object, got {}",
                json_type_name(value)
            )));
        }
        Self::deserialize(value)
            .map_err(|e| StatementError::new(format!("invalid query specification: {}", e)))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Hosts send loosely typed flags ("output": 1, "output": "yes").
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// Result of one statement in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The statement succeeded and returned this many rows
    RowCount(usize),
    /// The statement failed
    Failure,
}

impl QueryOutcome {
    /// Wire representation: the row count, or `-1` for a failure
    pub fn as_count(&self) -> i64 {
        match self {
            QueryOutcome::RowCount(n) => *n as i64,
            QueryOutcome::Failure => FAILURE_SENTINEL,
        }
    }

    /// Whether the statement failed
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, QueryOutcome::Failure)
    }
}

impl Serialize for QueryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_count())
    }
}

impl<'de> Deserialize<'de> for QueryOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let count = i64::deserialize(deserializer)?;
        match count {
            FAILURE_SENTINEL => Ok(QueryOutcome::Failure),
            n if n >= 0 => Ok(QueryOutcome::RowCount(n as usize)),
            n => Err(de::Error::custom(format!("invalid query outcome: {}", n))),
        }
    }
}

/// Render an outcome list as the `_queryCounts` JSON array
pub fn outcomes_to_value(outcomes: &[QueryOutcome]) -> Value {
    Value::Array(outcomes.iter().map(|o| Value::from(o.as_count())).collect())
}

/// Summary of one executed batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Collected rows, in query order then result-set order
    pub rows: Vec<Row>,

    /// One outcome per query, same index as the input batch
    pub outcomes: Vec<QueryOutcome>,
}

impl BatchResult {
    /// Number of failed statements
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// Build the outbound message: a shallow copy of the inbound one with
    /// the payload replaced by the rows and the outcome list attached.
    pub fn into_message(self, inbound: &Message) -> Message {
        let mut outbound = inbound.clone();
        outbound.insert(QUERY_COUNTS_FIELD, outcomes_to_value(&self.outcomes));
        outbound.set_payload(Value::Array(self.rows.into_iter().map(Value::Object).collect()));
        outbound
    }
}

/// Copy of `msg` annotated with the outcomes recorded so far
pub fn annotate_progress(msg: &Message, outcomes: &[QueryOutcome]) -> Message {
    let mut annotated = msg.clone();
    annotated.insert(QUERY_COUNTS_FIELD, outcomes_to_value(outcomes));
    annotated
}

/// Check the inbound payload shape and borrow the batch
pub fn validate_payload(msg: &Message) -> Result<&[Value], NodeError> {
    match msg.payload() {
        Some(Value::Array(queries)) => Ok(queries),
        _ => Err(NodeError::Validation(PAYLOAD_NOT_ARRAY.to_string())),
    }
}
