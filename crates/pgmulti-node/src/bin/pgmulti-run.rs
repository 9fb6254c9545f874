use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

use pgmulti_monitoring::LogExt;
use pgmulti_node::runner::{self, FlowFile, JsonLinesHost, RunnerSettings};

/// Usage: `pgmulti-run [settings-file]`, defaulting to `pgmulti.toml`
#[tokio::main]
async fn main() -> Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pgmulti.toml"));

    let settings = RunnerSettings::load(Some(settings_path.as_path()))
        .context("Failed to load configuration")?;

    pgmulti_monitoring::init(&settings.monitoring)
        .context("Failed to initialize monitoring")?;

    let flow = FlowFile::load(&settings.flow_file)?;
    let node = flow
        .build_node()
        .log_err("Node construction failed")
        .context("Failed to create node")?;
    let node = Arc::new(node);

    let host = Arc::new(JsonLinesHost::new(tokio::io::stdout()));
    let input = BufReader::new(tokio::io::stdin());
    let result = runner::run(node.clone(), input, host).await;

    node.close().await;
    result.log_err("Runner failed").map(|_| ())
}
