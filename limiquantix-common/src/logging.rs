//! Logging initialization using tracing.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the specified log level.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
///
/// # Example
/// ```
/// limiquantix_common::init_logging("info").unwrap();
/// ```
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

/// Initialize logging with JSON output format.
/// Suitable for production environments with log aggregation.
pub fn init_logging_json(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

/// Logs how long an operation took once it completes.
#[derive(Debug)]
pub struct TimedOperation {
    name: &'static str,
    started: Instant,
}

impl TimedOperation {
    pub fn start(name: &'static str) -> Self {
        info!(operation = name, "Operation started");
        Self {
            name,
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log successful completion.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        info!(
            operation = self.name,
            elapsed_ms = elapsed.as_millis() as u64,
            "Operation completed"
        );
        elapsed
    }

    /// Log failure with the error that ended the operation.
    pub fn fail(self, err: &dyn std::fmt::Display) -> Duration {
        let elapsed = self.elapsed();
        error!(
            operation = self.name,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "Operation failed"
        );
        elapsed
    }
}
