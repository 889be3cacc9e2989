//! Configuration management for dashnet
//!
//! This module provides configuration persistence for refresh timing,
//! initial display toggles and process-name derivation.

use crate::error::{DashnetError, Result};
use crate::toggle::ViewMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// dashnet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Refresh timing options
    #[serde(default)]
    pub general: GeneralConfig,
    /// Initial display options
    #[serde(default)]
    pub display: DisplayConfig,
    /// Process naming options
    #[serde(default)]
    pub process: ProcessConfig,
}

/// Refresh timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Background poll period in milliseconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    /// Bounded wait for the shared lock when publishing a snapshot
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Seconds before a transient status message is dismissed
    #[serde(default = "default_status_message_secs")]
    pub status_message_secs: u64,
}

/// Initial display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Show hostnames instead of IPs at startup
    #[serde(default = "default_true")]
    pub resolve_dns: bool,
    /// Show service names instead of ports at startup
    #[serde(default = "default_true")]
    pub resolve_service: bool,
    /// View shown at startup
    #[serde(default)]
    pub start_view: ViewMode,
}

/// Process naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Binary names treated as shared interpreters
    #[serde(default = "default_interpreters")]
    pub interpreters: Vec<String>,
    /// Truncation width for the interpreter argument
    #[serde(default = "default_argument_width")]
    pub argument_width: usize,
}

// Default value functions
fn default_refresh_interval() -> u64 {
    1000 // 1 second
}

fn default_publish_timeout() -> u64 {
    200
}

fn default_status_message_secs() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_interpreters() -> Vec<String> {
    ["python", "java", "node", "ruby", "perl", "php"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_argument_width() -> usize {
    24
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            publish_timeout_ms: default_publish_timeout(),
            status_message_secs: default_status_message_secs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            resolve_dns: true,
            resolve_service: true,
            start_view: ViewMode::default(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            interpreters: default_interpreters(),
            argument_width: default_argument_width(),
        }
    }
}

impl GeneralConfig {
    /// Background poll period
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Bounded wait for the shared lock
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// How long a status message stays visible
    pub fn status_message_ttl(&self) -> Duration {
        Duration::from_secs(self.status_message_secs)
    }
}

impl Config {
    /// Get the default configuration directory
    ///
    /// Returns `~/.config/dashnet` on Unix-like systems,
    /// or `%APPDATA%\dashnet` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        Ok(config_dir.join("dashnet"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_file = Self::default_path()?.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| {
            DashnetError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path()?;
        std::fs::create_dir_all(&config_dir)?;
        self.save_to(&config_dir.join("config.toml"))
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| DashnetError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.general.refresh_interval_ms == 0 {
            return Err(DashnetError::ConfigError(
                "refresh_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.process.argument_width == 0 {
            return Err(DashnetError::ConfigError(
                "argument_width must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
