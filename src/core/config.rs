use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory holding pose_landmarker_{lite,full,heavy}.task
    pub asset_dir: PathBuf,
    /// Fallback re-check interval of the polling driver (1-1000 ms)
    pub poll_interval_ms: u64,
    /// Warn when one inference holds the gate longer than this
    pub stall_warning_ms: u64,
    /// Log level: "trace", "debug", "info", "warn" or "error"
    pub log_level: String,
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut asset_dir = home_dir().unwrap_or_else(|| PathBuf::from("."));
        asset_dir.push(".pose_bridge");
        asset_dir.push("models");

        Self {
            asset_dir,
            poll_interval_ms: 10,
            stall_warning_ms: 5_000,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file, creating with defaults if it doesn't exist
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: BridgeConfig = serde_json::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1_000 {
            return Err(ConfigError::Invalid(format!(
                "Invalid poll interval: {}ms. Must be between 1 and 1000",
                self.poll_interval_ms
            )));
        }

        if self.stall_warning_ms < self.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "Invalid stall warning threshold: {}ms. Must be at least the poll interval ({}ms)",
                self.stall_warning_ms, self.poll_interval_ms
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Reset to default configuration
    pub fn reset() -> ConfigResult<Self> {
        let config = Self::default();
        config.save()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stall_warning(&self) -> Duration {
        Duration::from_millis(self.stall_warning_ms)
    }

    /// Config with a custom asset directory and defaults otherwise
    pub fn with_asset_dir(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            ..Self::default()
        }
    }

    /// Get the configuration file path
    fn get_config_path() -> ConfigResult<PathBuf> {
        let mut path = home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        path.push(".pose_bridge");
        path.push("config");
        path.push("settings.json");

        Ok(path)
    }
}
