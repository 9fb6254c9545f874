//! Standalone host for one query node.
//!
//! Reads newline-delimited JSON messages, hands each one to the node as
//! soon as it arrives and writes every host callback as a JSON line.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use async_trait::async_trait;
use pgmulti_core::types::MSG_ID_FIELD;
use pgmulti_core::{ContextScope, InMemoryContextStore, Message, NodeError, NodeHost};
use pgmulti_monitoring::MonitoringConfig;

use crate::config::{ConfigRegistry, DatabaseConfigEntity, NodeDefinition};
use crate::credentials::{CredentialStore, Credentials, InMemoryCredentialStore};
use crate::node::PostgresNode;

/// Environment prefix of runner settings, e.g. `PGMULTI_FLOW_FILE`
pub const ENV_PREFIX: &str = "PGMULTI";

/// Runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Flow file describing the node, its database and its context
    pub flow_file: PathBuf,

    /// Logging setup
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl RunnerSettings {
    /// Load settings from an optional file, then `PGMULTI_*` variables
    ///
    /// Nested keys use a double underscore, as in
    /// `PGMULTI_MONITORING__LOG_FILTER`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read runner settings")?
            .try_deserialize()
            .context("Invalid runner settings")?;
        Ok(settings)
    }
}

/// Everything a node needs from its host: database entities, the node
/// definition, context variables and stored credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowFile {
    /// Database configuration entities
    #[serde(default)]
    pub databases: Vec<DatabaseConfigEntity>,

    /// The node to run
    pub node: NodeDefinition,

    /// Flow context variables
    #[serde(default)]
    pub flow: Map<String, Value>,

    /// Global context variables
    #[serde(default)]
    pub global: Map<String, Value>,

    /// Credentials by entity id
    #[serde(default)]
    pub credentials: HashMap<String, Credentials>,
}

impl FlowFile {
    /// Parse a flow file
    pub fn from_json(json: &str) -> Result<Self, NodeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a flow file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read flow file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid flow file {}", path.display()))
    }

    /// Construct the node; must be called from within a Tokio runtime
    pub fn build_node(&self) -> Result<PostgresNode, NodeError> {
        let registry: ConfigRegistry = self.databases.iter().cloned().collect();

        let context = InMemoryContextStore::new();
        for (key, value) in &self.flow {
            context.set(ContextScope::Flow, key.as_str(), value.clone());
        }
        for (key, value) in &self.global {
            context.set(ContextScope::Global, key.as_str(), value.clone());
        }

        let credentials = InMemoryCredentialStore::new();
        for (id, stored) in &self.credentials {
            credentials.add(id, stored.clone());
        }

        PostgresNode::new(self.node.clone(), &registry, &context, &credentials)
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum HostRecord<'a> {
    Send {
        message: &'a Message,
    },
    Error {
        kind: &'static str,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a Message>,
    },
    Done,
}

/// Host that writes each callback as one JSON line
pub struct JsonLinesHost<W> {
    out: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesHost<W> {
    /// Write to `out`
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Flush buffered output
    pub async fn flush(&self) -> std::io::Result<()> {
        self.out.lock().await.flush().await
    }

    /// The underlying writer
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    async fn emit(&self, record: HostRecord<'_>) {
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode host record");
                return;
            }
        };
        line.push(b'\n');

        let mut out = self.out.lock().await;
        if let Err(e) = out.write_all(&line).await {
            warn!(error = %e, "Failed to write host record");
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> NodeHost for JsonLinesHost<W> {
    async fn send(&self, msg: Message) {
        self.emit(HostRecord::Send { message: &msg }).await
    }

    async fn report_error(&self, error: &NodeError, msg: Option<&Message>) {
        self.emit(HostRecord::Error {
            kind: error.kind(),
            error: error.to_string(),
            message: msg,
        })
        .await
    }

    async fn done(&self) {
        self.emit(HostRecord::Done).await
    }
}

/// Parse one input line into a message, assigning a message id when the
/// line has none
pub fn parse_message(line: &str) -> Result<Message, NodeError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| NodeError::Validation(format!("invalid JSON message: {}", e)))?;
    let mut msg = Message::from_value(value)?;
    if msg.msg_id().is_none() {
        msg.insert(MSG_ID_FIELD, Value::String(uuid::Uuid::new_v4().to_string()));
    }
    Ok(msg)
}

/// Feed every message from `input` to `node` and wait for all of them
///
/// Messages are handled concurrently, bounded only by the node's pool.
/// Lines that are not JSON objects are reported on `host` and skipped.
/// Returns the number of messages handed to the node.
pub async fn run<R, W>(
    node: Arc<PostgresNode>,
    input: R,
    host: Arc<JsonLinesHost<W>>,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = input.lines();
    let mut tasks = JoinSet::new();
    let mut accepted = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg = match parse_message(line) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, "Skipping input line");
                host.report_error(&err, None).await;
                continue;
            }
        };

        debug!(msg_id = msg.msg_id().unwrap_or_default(), "Dispatching message");
        accepted += 1;
        let node = node.clone();
        let host = host.clone();
        tasks.spawn(async move { node.on_input(msg, host.as_ref()).await });
        reap_finished(&mut tasks);
    }

    while let Some(joined) = tasks.join_next().await {
        log_join_error(joined);
    }

    host.flush().await.context("Failed to flush output")?;
    info!(node_id = %node.id(), messages = accepted, "Input exhausted");
    Ok(accepted)
}

/// Collect tasks that already finished without waiting for the rest;
/// returns how many were collected
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        log_join_error(joined);
        reaped += 1;
    }
    reaped
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Message task failed");
    }
}
