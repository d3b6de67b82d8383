//! # limiquantix Volume Control
//!
//! Inspect and manage libvirt storage volumes from the command line.
//!
//! ## Usage
//! ```bash
//! limiquantix-volctl --pool default info disk0.img
//! limiquantix-volctl resize disk0.img 20G --allocate
//! limiquantix-volctl --dev --json xml dev-disk0.img
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;

use limiquantix_common::TimedOperation;
use limiquantix_volctl::config::LogFormat;
use limiquantix_volctl::{commands, Args, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::resolve(&args)?;

    // Initialize logging
    match config.logging.format {
        LogFormat::Pretty => limiquantix_common::init_logging(&config.logging.level)?,
        LogFormat::Json => limiquantix_common::init_logging_json(&config.logging.level)?,
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = args.command.name(),
        "Starting limiquantix Volume Control"
    );
    config.log_summary();

    let as_json = config.output.json;
    let heartbeat = Duration::from_secs(config.storage.heartbeat_secs.max(1));
    let command = args.command;
    let op = TimedOperation::start(command.name());

    // libvirt calls block until the storage driver is done.
    let mut task = tokio::task::spawn_blocking(move || commands::execute(&config, &command));

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    let result = loop {
        tokio::select! {
            joined = &mut task => break joined.context("Volume operation panicked")?,
            _ = ticker.tick() => {
                info!(
                    operation = op.name(),
                    elapsed_secs = op.elapsed().as_secs(),
                    "Operation still running"
                );
            }
        }
    };

    match result {
        Ok(output) => {
            op.finish();
            println!("{}", output.render(as_json));
            Ok(())
        }
        Err(e) => {
            op.fail(&e);
            Err(e)
        }
    }
}
