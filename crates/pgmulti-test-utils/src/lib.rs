//! Testing utilities for the pgmulti node.
//!
//! Scripted fakes for the driver capability and the host runtime, plus
//! mockall-generated mocks for the narrow lookup traits.

pub mod mocks;

pub use mocks::context::MockContextStore;
pub use mocks::host::{ErrorReport, HostEvent, RecordingHost};
pub use mocks::pool::{MockPool, PoolCounters};

use pgmulti_core::{Message, Row};
use serde_json::Value;

/// Build a message whose payload is the given JSON
pub fn message(payload: Value) -> Message {
    Message::with_payload(payload)
}

/// Build a result row from a JSON object literal
///
/// Non-object values produce an empty row.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}
