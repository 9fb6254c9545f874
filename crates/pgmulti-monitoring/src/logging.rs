//! Structured logging module using tracing.
//!
//! Human-readable output for development, JSON lines for log aggregation,
//! and an optional daily-rotated JSON log file.

use anyhow::Context;
use std::path::Path;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::MonitoringConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize structured logging
///
/// Logs go to stderr so that stdout stays free for message output.
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.enable_json_logging {
        layers.push(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(log_file) = &config.log_file {
        let path = Path::new(log_file);
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pgmulti.log".to_string());
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, file_name);

        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(file_appender)
                .boxed(),
        );
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    info!(
        service_name = %config.service_name,
        log_format = if config.enable_json_logging { "json" } else { "pretty" },
        log_file = ?config.log_file,
        "Logging initialized"
    );

    Ok(())
}

/// Trait to add log context to results
pub trait LogExt<T, E> {
    /// Log error with additional context before returning
    fn log_err(self, message: &str) -> Result<T, E>;
}

impl<T, E: std::fmt::Display> LogExt<T, E> for Result<T, E> {
    fn log_err(self, message: &str) -> Result<T, E> {
        if let Err(ref e) = self {
            tracing::error!("{}: {}", message, e);
        }
        self
    }
}

/// Initializes test tracing for unit tests
pub fn init_test_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_target(false)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
