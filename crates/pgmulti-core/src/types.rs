use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NodeError;

/// Name of the message field carrying the batch
pub const PAYLOAD_FIELD: &str = "payload";

/// Name of the message field carrying the host-assigned message id
pub const MSG_ID_FIELD: &str = "_msgid";

/// A message flowing between nodes
///
/// Messages are plain JSON objects. The node only cares about `payload`
/// and the supplementary fields it attaches; everything else is carried
/// through untouched when an outbound message is built.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    /// Create an empty message
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message holding only a payload
    pub fn with_payload(payload: Value) -> Self {
        let mut msg = Self::new();
        msg.set_payload(payload);
        msg
    }

    /// Build a message from an arbitrary JSON value
    ///
    /// Fails unless the value is a JSON object.
    pub fn from_value(value: Value) -> Result<Self, NodeError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(NodeError::Validation(format!(
                "message must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// The message payload, if any
    #[inline]
    pub fn payload(&self) -> Option<&Value> {
        self.fields.get(PAYLOAD_FIELD)
    }

    /// Replace the payload
    #[inline]
    pub fn set_payload(&mut self, payload: Value) {
        self.fields.insert(PAYLOAD_FIELD.to_string(), payload);
    }

    /// Host-assigned message id, if present
    pub fn msg_id(&self) -> Option<&str> {
        self.fields.get(MSG_ID_FIELD).and_then(Value::as_str)
    }

    /// Get a field by name
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    /// Borrow the underlying JSON object
    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Take ownership of the message as a JSON value
    #[inline]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Message {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Name of a JSON value's type, for error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_from_object() {
        let msg = Message::from_value(json!({"_msgid": "abc", "payload": [1, 2], "topic": "t"})).unwrap();
        assert_eq!(msg.msg_id(), Some("abc"));
        assert_eq!(msg.payload(), Some(&json!([1, 2])));
        assert_eq!(msg.get("topic"), Some(&json!("t")));
    }

    #[test]
    fn test_message_from_non_object() {
        let err = Message::from_value(json!("hello")).unwrap_err();
        assert_eq!(
            err,
            NodeError::Validation("message must be a JSON object, got string".to_string())
        );
    }

    #[test]
    fn test_message_serializes_transparently() {
        let mut msg = Message::with_payload(json!([]));
        msg.insert("topic", json!("orders"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"payload": [], "topic": "orders"}));
    }

    #[test]
    fn test_set_payload_replaces() {
        let mut msg = Message::with_payload(json!("old"));
        msg.set_payload(json!("new"));
        assert_eq!(msg.payload(), Some(&json!("new")));
        assert_eq!(msg.as_map().len(), 1);
    }
}
