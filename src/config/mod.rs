//! Configuration management for the datastore server
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

pub use watcher::{ConfigChange, ConfigWatcher};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Datastore behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatastoreConfig {
    /// JSON file with the initial device state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
    /// Long-poll wait budget in seconds
    #[serde(default = "default_wait_budget_secs")]
    pub wait_budget_secs: u64,
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            seed: None,
            wait_budget_secs: default_wait_budget_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl DatastoreConfig {
    pub fn wait_budget(&self) -> Duration {
        Duration::from_secs(self.wait_budget_secs)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        // Validate the loaded configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port cannot be 0");
        }
        if self.datastore.wait_budget_secs == 0 {
            anyhow::bail!("datastore.wait_budget_secs must be at least 1");
        }
        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level cannot be empty");
        }
        Ok(())
    }
}

// Default value functions
fn default_bind() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
fn default_port() -> u16 { crate::api::DEFAULT_API_PORT }
fn default_wait_budget_secs() -> u64 { 15 }
fn default_log_level() -> String { "info".to_string() }
