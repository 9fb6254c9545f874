//! Sequential batch execution over one pooled connection.
//!
//! A batch is the array of query specifications in a message's payload.
//! All of its statements run in order on a single connection. A failing
//! statement is reported and recorded as `-1` in the outcome list, and the
//! batch carries on with the next one.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};

use pgmulti_core::batch::{annotate_progress, validate_payload};
use pgmulti_core::{
    BatchResult, CompletionMode, ConnectionPool, Message, NodeError, NodeHost, PooledConnection,
    QueryOutcome, QuerySpec, Row, StatementError,
};
use pgmulti_monitoring::NodeMetrics;

/// Runs inbound batches for one node
pub struct BatchExecutor {
    node_id: String,
    pool: Arc<dyn ConnectionPool>,
    output_enabled: bool,
    completion: CompletionMode,
}

impl BatchExecutor {
    /// Create an executor with output disabled and the default completion mode
    pub fn new(node_id: impl Into<String>, pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            node_id: node_id.into(),
            pool,
            output_enabled: false,
            completion: CompletionMode::default(),
        }
    }

    /// Enable or disable the outbound result message
    pub fn with_output(mut self, enabled: bool) -> Self {
        self.output_enabled = enabled;
        self
    }

    /// Set the completion mode
    pub fn with_completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }

    /// The pool statements run on
    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    /// Handle one inbound message end to end
    ///
    /// Emits the result message when output is enabled, reports every error
    /// on the host's error channel and signals completion.
    pub async fn process(&self, msg: Message, host: &dyn NodeHost) {
        let span = info_span!(
            "batch",
            node_id = %self.node_id,
            msg_id = msg.msg_id().unwrap_or_default()
        );

        async {
            let started = Instant::now();
            match self.execute_batch(&msg, host).await {
                Ok(result) => {
                    NodeMetrics::record_batch(
                        &self.node_id,
                        result.outcomes.len(),
                        result.failures(),
                        result.rows.len(),
                        started.elapsed().as_secs_f64() * 1000.0,
                    );
                    if self.output_enabled {
                        host.send(result.into_message(&msg)).await;
                    }
                    host.done().await;
                }
                Err(err) => {
                    error!(error = %err, kind = err.kind(), "Batch rejected");
                    NodeMetrics::record_batch_rejected(&self.node_id, err.kind());
                    host.report_error(&err, Some(&msg)).await;
                    if self.completion.signals_after_setup_failure() {
                        host.done().await;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the batch carried by `msg`
    ///
    /// Statement failures are reported through `host` as they happen and
    /// never fail the batch. Errors returned here mean no statement ran:
    /// the payload was not an array or no connection could be acquired.
    pub async fn execute_batch(
        &self,
        msg: &Message,
        host: &dyn NodeHost,
    ) -> Result<BatchResult, NodeError> {
        let queries = validate_payload(msg)?;

        debug!(queries = queries.len(), pool = ?self.pool.status(), "Acquiring connection");
        let mut conn = self.pool.acquire().await?;

        let mut progress = Progress::new(queries.len(), self.output_enabled);
        for (index, raw) in queries.iter().enumerate() {
            match run_statement(conn.as_mut(), raw).await {
                Ok((rows, wants_output)) => {
                    debug!(index, rows = rows.len(), "Statement succeeded");
                    progress.record_rows(rows, wants_output);
                }
                Err(error) => {
                    warn!(index, code = ?error.code, error = %error, "Statement failed");
                    progress.record_failure();
                    let err = NodeError::Query { index, error };
                    host.report_error(&err, Some(&progress.annotate(msg))).await;
                }
            }
        }

        conn.release();
        Ok(progress.finish())
    }
}

async fn run_statement(
    conn: &mut dyn PooledConnection,
    raw: &Value,
) -> Result<(Vec<Row>, bool), StatementError> {
    let spec = QuerySpec::from_value(raw)?;
    let rows = conn.query(&spec.sql, &spec.params).await?;
    Ok((rows, spec.wants_output))
}

/// Outcomes and rows gathered so far in one batch
struct Progress {
    rows: Vec<Row>,
    outcomes: Vec<QueryOutcome>,
    keep_rows: bool,
}

impl Progress {
    fn new(queries: usize, keep_rows: bool) -> Self {
        Self {
            rows: Vec::new(),
            outcomes: Vec::with_capacity(queries),
            keep_rows,
        }
    }

    fn record_rows(&mut self, rows: Vec<Row>, wants_output: bool) {
        self.outcomes.push(QueryOutcome::RowCount(rows.len()));
        if self.keep_rows && wants_output {
            self.rows.extend(rows);
        }
    }

    fn record_failure(&mut self) {
        self.outcomes.push(QueryOutcome::Failure);
    }

    fn annotate(&self, msg: &Message) -> Message {
        annotate_progress(msg, &self.outcomes)
    }

    fn finish(self) -> BatchResult {
        BatchResult {
            rows: self.rows,
            outcomes: self.outcomes,
        }
    }
}
