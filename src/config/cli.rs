//! Command-line and environment overrides.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::{ServerConfig, StorageBackend};
use crate::config::validation::validate_config;

#[derive(Debug, Default, Parser)]
#[command(name = "metrics-server")]
#[command(about = "Gauge and counter ingestion server", long_about = None)]
pub struct ServerArgs {
    /// TOML configuration file
    #[arg(short, long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Snapshot file; selects the file-backed storage
    #[arg(short, long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<String>,

    /// Seconds between snapshot writes, 0 for synchronous writes
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Restore the previous snapshot at startup
    #[arg(short, long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// Expose Prometheus metrics for the server itself on this address
    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<String>,
}

impl ServerArgs {
    /// Build the effective configuration: defaults, then the config file, then these overrides.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(address) = &self.address {
            config.listener.bind_address = address.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(path) = &self.file_storage_path {
            config.storage.backend = StorageBackend::File;
            config.storage.file_path = path.clone();
        }
        if let Some(interval) = self.store_interval {
            config.storage.store_interval_secs = interval;
        }
        if let Some(restore) = self.restore {
            config.storage.restore = restore;
        }
        if let Some(addr) = &self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr.clone();
        }
    }
}
