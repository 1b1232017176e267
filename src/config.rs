//! Configuration for thyspace

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SpaceError};

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thyspace")
        .join("config.toml")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Interface to bind the HTTP API to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Radius used by nearby queries that do not name one
    #[serde(default = "default_radius_m")]
    pub default_radius_m: f64,

    /// Presence records older than this are dropped
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_secs: u64,

    /// How often the background sweeper runs
    #[serde(default = "default_presence_sweep")]
    pub presence_sweep_secs: u64,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_http_port() -> u16 {
    8095
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_radius_m() -> f64 {
    2000.0
}

fn default_presence_ttl() -> u64 {
    3600
}

fn default_presence_sweep() -> u64 {
    60
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            bind_host: default_bind_host(),
            default_radius_m: default_radius_m(),
            presence_ttl_secs: default_presence_ttl(),
            presence_sweep_secs: default_presence_sweep(),
            event_bus_capacity: default_event_bus_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| SpaceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SpaceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_radius_m > 0.0) {
            return Err(SpaceError::Config("default_radius_m must be positive".into()));
        }
        if self.presence_ttl_secs == 0 {
            return Err(SpaceError::Config("presence_ttl_secs must be positive".into()));
        }
        if self.presence_sweep_secs == 0 {
            return Err(SpaceError::Config("presence_sweep_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn presence_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.presence_sweep_secs)
    }

    /// `host:port` for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.http_port)
    }
}
