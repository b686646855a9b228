//! Application configuration
//!
//! Loaded from a TOML file (`~/.config/wwcp-core/config.toml` by default,
//! or `$WWCP_CONFIG`). Every key is optional; a missing file yields the
//! defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::sessions::{
    RetentionPolicy, DEFAULT_SUCCESSFUL_RETENTION_DAYS, DEFAULT_UNSUCCESSFUL_RETENTION_DAYS,
};
use crate::domain::ids::{RoamingNetworkId, SystemId};

const APP_DIR: &str = "wwcp-core";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// First part of every log file name
    pub name: String,
    pub roaming_network_id: String,
    pub log_dir: PathBuf,
    /// Host identity stamped on every command
    pub system_id: String,
    /// fsync after every append
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "ChargingSessions".to_string(),
            roaming_network_id: "Prod".to_string(),
            log_dir: default_log_dir(),
            system_id: "wwcp-core".to_string(),
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    pub fn roaming_network_id(&self) -> RoamingNetworkId {
        RoamingNetworkId::new(self.roaming_network_id.as_str())
    }

    pub fn system_id(&self) -> SystemId {
        SystemId::new(self.system_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub successful_days: u32,
    pub unsuccessful_days: u32,
    pub check_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            successful_days: DEFAULT_SUCCESSFUL_RETENTION_DAYS,
            unsuccessful_days: DEFAULT_UNSUCCESSFUL_RETENTION_DAYS,
            check_interval_secs: 3600,
        }
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::from_days(self.successful_days, self.unsuccessful_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `plain` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape endpoint, e.g. `0.0.0.0:9184`
    pub prometheus_listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: 30,
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.name.is_empty() || self.store.roaming_network_id.is_empty() {
            return Err(ConfigError::Invalid(
                "store.name and store.roaming_network_id must not be empty".into(),
            ));
        }
        // Both are part of the log file name.
        if self.store.name.contains(['/', '\\', '_']) || self.store.roaming_network_id.contains(['/', '\\', '_']) {
            return Err(ConfigError::Invalid(
                "store.name and store.roaming_network_id must not contain '/', '\\' or '_'".into(),
            ));
        }
        if self.retention.successful_days > self.retention.unsuccessful_days {
            return Err(ConfigError::Invalid(
                "retention.successful_days must not exceed retention.unsuccessful_days".into(),
            ));
        }
        if self.retention.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "retention.check_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

pub fn default_log_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("sessions")
}
