//! The host seam of a node.
//!
//! A node talks to whatever runs it only through [`NodeHost`]: it forwards
//! result messages, reports errors and signals completion, the latter
//! governed by [`CompletionMode`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::types::Message;

/// Callbacks the host runtime provides while a node handles one message
#[async_trait]
pub trait NodeHost: Send + Sync {
    /// Emit a message downstream
    async fn send(&self, msg: Message);

    /// Report an error on the host's error channel
    ///
    /// When a message is attached, downstream catch nodes can correlate
    /// the error with the input that caused it.
    async fn report_error(&self, error: &NodeError, msg: Option<&Message>);

    /// Signal that handling of the current message has finished
    async fn done(&self);
}

/// When the node signals completion after a batch that never started
///
/// A batch that fails validation or cannot acquire a connection is a
/// setup failure. The historical behaviour leaves completion to the
/// host's own error path in that case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// No completion signal after a setup failure
    #[default]
    SkipOnSetupFailure,
    /// Completion is signalled for every message
    Always,
}

impl CompletionMode {
    /// Whether `done` is called after a setup failure
    pub fn signals_after_setup_failure(&self) -> bool {
        matches!(self, CompletionMode::Always)
    }
}
