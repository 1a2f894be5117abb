//! Configuration management for the dashboard.
//!
//! Defaults, then an optional TOML file, then environment variables
//! (`SQLITE_PATH`, `PORT`, `LOG_PATH`, `BIND_ADDRESS`), then CLI flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming an optional config file
pub const CONFIG_ENV: &str = "DASHBOARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Watcher SQLite database
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Watcher log file tailed by the live log panel
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("/data/watcher.db")
}

fn default_port() -> u16 {
    8080
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/data/watcher.log")
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            port: default_port(),
            log_path: default_log_path(),
            bind_address: default_bind_address(),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sqlite_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_path: Option<PathBuf>,
    pub bind_address: Option<String>,
}

impl DashboardConfig {
    /// Resolve the full configuration for the running process
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file = config_file
            .map(Path::to_path_buf)
            .or_else(|| non_empty_env(CONFIG_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(non_empty_env)?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply environment values. `lookup` returns `None` for unset or empty variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SQLITE_PATH") {
            self.sqlite_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }
        if let Some(path) = lookup("LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("BIND_ADDRESS") {
            self.bind_address = addr;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.sqlite_path {
            self.sqlite_path = path.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(path) = &overrides.log_path {
            self.log_path = path.clone();
        }
        if let Some(addr) = &overrides.bind_address {
            self.bind_address = addr.clone();
        }
    }

    /// `host:port` to bind; host names are resolved by the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
