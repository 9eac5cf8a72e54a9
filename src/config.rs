//! # Configuration Management Module
//!
//! Persistent monitor settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `link_path`: Serial device the sensor board prints readings to (`-` reads stdin)
//! - `root_directory`: Where day directories, hitrate and snapshot files go
//! - `signal_file`: File the capture process watches for the next video name
//! - `unit_scale`: Factor applied to every raw reading (board volts to uA)
//! - `history_capacity`: Samples retained in memory and written per snapshot
//! - `snapshot_interval`: Accepted readings between snapshots
//! - `capture_channel`: Channel whose sparks trigger the capture process
//! - `channel_names`: Short channel names used in hitrate file names and logs
//! - `status_interval`: Accepted readings between status log lines
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/spark-monitor/config.toml
//! - Linux: ~/.config/spark-monitor/config.toml
//! - Windows: %APPDATA%\spark-monitor\config.toml
//!
//! A path given on the command line overrides the default location.

use crate::error::ConfigError;
use crate::CHANNELS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link_path: PathBuf,
    pub root_directory: PathBuf,
    pub signal_file: PathBuf,
    pub unit_scale: f64,
    pub history_capacity: usize,
    pub snapshot_interval: u64,
    pub capture_channel: usize,
    pub channel_names: [String; CHANNELS],
    pub status_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root_directory = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spark-monitor");
        Self {
            link_path: PathBuf::from("/dev/ttyACM0"),
            signal_file: root_directory.join("flag.txt"),
            root_directory,
            unit_scale: 10.0,
            history_capacity: 45_000,
            snapshot_interval: 50_000,
            capture_channel: 2,
            channel_names: ["rd".to_string(), "cond".to_string(), "qc".to_string()],
            status_interval: 5_000,
        }
    }
}

impl Config {
    /// Get the path to the default config file
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spark-monitor")
            .join("config.toml")
    }

    /// Load config from the default location, creating it with defaults if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, creating it with defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<Config>(&contents).map_err(ConfigError::ParseFailed)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save_to(path)?;
                config
            }
            Err(e) => return Err(ConfigError::ReadFailed(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_channel >= CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "capture_channel {} out of range (0..{})",
                self.capture_channel, CHANNELS
            )));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be > 0".into()));
        }
        if self.snapshot_interval == 0 {
            return Err(ConfigError::Invalid("snapshot_interval must be > 0".into()));
        }
        if !self.unit_scale.is_finite() {
            return Err(ConfigError::Invalid("unit_scale must be finite".into()));
        }
        if self.channel_names.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid("channel names must not be empty".into()));
        }
        Ok(())
    }
}
