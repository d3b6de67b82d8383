//! Configuration management for the volume tool.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::cli::Args;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/volctl.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Output configuration
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Load the explicit config file, else the default one, else defaults,
    /// then apply CLI overrides.
    ///
    /// Only an explicitly requested file is required to exist.
    pub fn resolve(args: &Args) -> Result<Self> {
        let config = match &args.config {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };

        Ok(config.with_cli_overrides(args))
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref uri) = args.uri {
            self.storage.uri = uri.clone();
        }

        if let Some(ref pool) = args.pool {
            self.storage.pool = pool.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.dev {
            self.storage.backend = StorageBackend::Mock;
        }

        if args.json {
            self.output.json = true;
        }

        self
    }

    /// Log the effective settings.
    pub fn log_summary(&self) {
        info!(
            backend = ?self.storage.backend,
            uri = %self.storage.uri,
            pool = %self.storage.pool,
            "Volume tool configured"
        );
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type
    pub backend: StorageBackend,
    /// Libvirt connection URI
    pub uri: String,
    /// Pool that volume names are resolved in
    pub pool: String,
    /// Seconds between progress messages for long operations
    pub heartbeat_secs: u64,
    /// Development backend settings
    pub dev: DevConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Libvirt,
            uri: "qemu:///system".to_string(),
            pool: "default".to_string(),
            heartbeat_secs: 5,
            dev: DevConfig::default(),
        }
    }
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory backend for testing/development
    Mock,
    /// Libvirt storage driver
    #[default]
    Libvirt,
}

/// Contents of the in-memory pool used in development mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    /// Directory the pool pretends to live in
    pub target: String,
    /// Pool capacity in bytes
    pub capacity: u64,
    /// Volumes present at startup
    pub volumes: Vec<DevVolume>,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            target: "/var/lib/limiquantix/volumes".to_string(),
            capacity: 100 << 30,
            volumes: vec![DevVolume {
                name: "dev-disk0.img".to_string(),
                capacity: 1 << 30,
                allocation: 0,
            }],
        }
    }
}

/// A volume seeded into the development pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DevVolume {
    pub name: String,
    pub capacity: u64,
    #[serde(default)]
    pub allocation: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Result output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print results as JSON
    pub json: bool,
}
