//! Node metrics, recorded as structured log events.

use tracing::info;

/// pgmulti node metrics
pub struct NodeMetrics;

impl NodeMetrics {
    /// Record a completed batch
    pub fn record_batch(node_id: &str, queries: usize, failures: usize, rows: usize, duration_ms: f64) {
        info!(
            metric = "pgmulti.batch",
            node_id,
            queries,
            failures,
            rows,
            duration_ms,
            "Batch executed"
        );
    }

    /// Record a batch that never ran a statement
    pub fn record_batch_rejected(node_id: &str, kind: &str) {
        info!(metric = "pgmulti.batch_rejected", node_id, kind, "Batch rejected");
    }
}
