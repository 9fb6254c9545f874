//! Monitoring module for the pgmulti node.

use serde::{Deserialize, Serialize};
use tracing::info;

pub mod logging;
pub mod metrics;

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service name attached to log output
    pub service_name: String,
    /// Log level filter (e.g., "info,pgmulti=debug"); `RUST_LOG` wins when set
    pub log_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub enable_json_logging: bool,
    /// Also write JSON logs to this file, rotated daily
    pub log_file: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "pgmulti".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
            log_file: None,
        }
    }
}

/// Initialize monitoring system
pub fn init(config: &MonitoringConfig) -> anyhow::Result<()> {
    logging::init_logging(config)?;
    info!(service_name = %config.service_name, "Monitoring initialized");
    Ok(())
}


// Exported types
pub use crate::logging::LogExt;
pub use crate::metrics::NodeMetrics;
