//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/footfall/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/footfall/` (~/.config/footfall/)
//! - Data: `$XDG_DATA_HOME/footfall/` (~/.local/share/footfall/)
//! - State/Logs: `$XDG_STATE_HOME/footfall/` (~/.local/state/footfall/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Event store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Derived statistics configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event store configuration
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database (defaults to the XDG data dir)
    pub database: Option<PathBuf>,

    /// Name of the raw event table
    #[serde(default = "default_table")]
    pub table: String,

    /// Column holding the user identifier
    #[serde(default = "default_user_field")]
    pub user_field: String,

    /// Column holding the event timestamp
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Column holding semi-structured event metadata
    #[serde(default = "default_json_field")]
    pub json_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            table: default_table(),
            user_field: default_user_field(),
            timestamp_field: default_timestamp_field(),
            json_field: default_json_field(),
        }
    }
}

fn default_table() -> String {
    "events".to_string()
}

fn default_user_field() -> String {
    "user_id".to_string()
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

fn default_json_field() -> String {
    "metadata".to_string()
}

/// Derived statistics configuration
#[derive(Debug, Deserialize)]
pub struct StatsConfig {
    /// Minutes of inactivity separating two sessions
    #[serde(default = "default_gap_minutes")]
    pub gap_minutes: f64,

    /// Minimum session count for the active-user cohort (0 disables)
    #[serde(default = "default_min_sessions")]
    pub min_sessions: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            gap_minutes: default_gap_minutes(),
            min_sessions: default_min_sessions(),
        }
    }
}

fn default_gap_minutes() -> f64 {
    30.0
}

fn default_min_sessions() -> u32 {
    3
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/footfall/config.toml` (~/.config/footfall/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("footfall").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/footfall/` (~/.local/share/footfall/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("footfall")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/footfall/` (~/.local/state/footfall/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("footfall")
    }

    /// Returns the effective database file path
    ///
    /// The `store.database` setting wins; otherwise
    /// `$XDG_DATA_HOME/footfall/data.db`
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("data.db"))
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/footfall/footfall.log` (~/.local/state/footfall/footfall.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("footfall.log")
    }
}
