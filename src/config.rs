//! Configuration loaded from `wasteflow.toml`.
//!
//! The struct [`WasteflowConfig`] holds every tunable parameter.
//! Keys missing from the file fall back to sensible defaults.
//! `WASTEFLOW_DATA_PATH` and `WASTEFLOW_BIND` take precedence over the file.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "wasteflow.toml";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Top-level configuration loaded from `wasteflow.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasteflowConfig {
    /// JSON file backing the process store.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Address the REST server listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Speed factor used by `boost` when none is given on the command line.
    #[serde(default = "default_speed_factor")]
    pub default_speed_factor: i64,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("wasteflow-data.json")
}

fn default_bind_address() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_speed_factor() -> i64 {
    1
}

impl Default for WasteflowConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            bind_address: default_bind_address(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            default_speed_factor: default_speed_factor(),
        }
    }
}

impl WasteflowConfig {
    /// Loads `wasteflow.toml` from the working directory, or `path` when given.
    /// An explicit path must exist; the implicit one falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<WasteflowConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    // Environment variables win over the file.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("WASTEFLOW_DATA_PATH")
            && !path.is_empty()
        {
            self.data_path = PathBuf::from(path);
        }
        if let Some(bind) = lookup("WASTEFLOW_BIND")
            && !bind.is_empty()
        {
            self.bind_address = bind;
        }
    }

    fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.default_speed_factor < 1 {
            bail!(
                "default_speed_factor must be at least 1, got {}",
                self.default_speed_factor
            );
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("invalid bind_address '{}'", self.bind_address))
    }
}
