//! Configuration module for StimCap-RS
//!
//! This module handles the application configuration:
//! - Where recordings go and which record layout they use
//! - How the stimulus channel is addressed and what it sends
//! - Sample source and logging settings
//!
//! # Config Location
//!
//! The configuration is stored as TOML in the platform-appropriate config
//! directory under `dev.hxyulin.stimcap-rs`:
//!
//! - **Linux**: `~/.config/dev.hxyulin.stimcap-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.stimcap-rs/config.toml`
//!
//! Missing keys fall back to their defaults, so a partial file is valid.
//!
//! # Example
//!
//! ```ignore
//! use stimcap_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.channel.enabled = false;
//! config.save(AppConfig::default_path().unwrap())?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, StimCapError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.stimcap-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Current config version
pub const CONFIG_VERSION: u32 = 1;

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Recording output settings
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Stimulus channel settings
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Sample source settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            recording: RecordingConfig::default(),
            channel: ChannelConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StimCapError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config = Self::from_toml(&content)
            .map_err(|e| e.with_context(format!("Invalid config {:?}", path)))?;
        Ok(config)
    }

    /// Parse and validate config text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StimCapError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Serialize to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StimCapError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Save the config, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StimCapError::Config(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        std::fs::write(path, self.to_toml()?)
            .map_err(|e| StimCapError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.version > CONFIG_VERSION {
            return Err(StimCapError::Config(format!(
                "Config version {} is newer than supported version {}",
                self.version, CONFIG_VERSION
            )));
        }
        if self.recording.file_extension.is_empty() {
            return Err(StimCapError::Config("recording.file_extension must not be empty".to_string()));
        }
        if self.channel.name.is_empty() || self.channel.name.contains(&['/', '\\'][..]) {
            return Err(StimCapError::Config(format!(
                "channel.name '{}' must be a non-empty plain name",
                self.channel.name
            )));
        }
        if self.channel.greeting.contains('\n') || self.channel.ready_sentinel.contains('\n') {
            return Err(StimCapError::Config("channel messages must be single lines".to_string()));
        }
        if self.device.mock_rate_hz == 0 {
            return Err(StimCapError::Config("device.mock_rate_hz must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Path for a new recording started at `now`
    pub fn recording_path(&self, now: chrono::DateTime<chrono::Local>) -> PathBuf {
        self.recording.recording_path(now)
    }

    /// Ensure the recording output directory exists
    pub fn ensure_output_dir(&self) -> Result<PathBuf> {
        let dir = &self.recording.output_dir;
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(dir.clone())
    }
}
