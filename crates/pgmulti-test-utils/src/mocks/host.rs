//! Recording implementation of the NodeHost trait.

use async_trait::async_trait;
use parking_lot::Mutex;

use pgmulti_core::{Message, NodeError, NodeHost};

/// One call made on the host's error channel
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// Reported error
    pub error: NodeError,
    /// Message attached to the report
    pub message: Option<Message>,
}

/// Host callbacks in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// `send`
    Sent,
    /// `report_error`, with the error kind
    Error(&'static str),
    /// `done`
    Done,
}

/// A host that records every callback
#[derive(Debug, Default)]
pub struct RecordingHost {
    sent: Mutex<Vec<Message>>,
    errors: Mutex<Vec<ErrorReport>>,
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent downstream
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Error reports
    pub fn errors(&self) -> Vec<ErrorReport> {
        self.errors.lock().clone()
    }

    /// Number of completion signals
    pub fn done_count(&self) -> usize {
        self.events.lock().iter().filter(|e| **e == HostEvent::Done).count()
    }

    /// All callbacks, in order
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NodeHost for RecordingHost {
    async fn send(&self, msg: Message) {
        self.sent.lock().push(msg);
        self.events.lock().push(HostEvent::Sent);
    }

    async fn report_error(&self, error: &NodeError, msg: Option<&Message>) {
        self.errors.lock().push(ErrorReport {
            error: error.clone(),
            message: msg.cloned(),
        });
        self.events.lock().push(HostEvent::Error(error.kind()));
    }

    async fn done(&self) {
        self.events.lock().push(HostEvent::Done);
    }
}
