//! Configuration sections
//!
//! Each section maps to a table in `config.toml`:
//!
//! - [`RecordingConfig`] - Output location, record layout, tag reset policy
//! - [`ChannelConfig`] - Stimulus channel socket and fixed outbound messages
//! - [`DeviceConfig`] - Sample source settings
//! - [`LoggingConfig`] - Log filter and optional log directory

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::session::types::{RecordFormat, TagResetPolicy};
use crate::stimulus::message::{DEFAULT_GREETING, DEFAULT_READY_SENTINEL};

/// Default recording file extension
pub const DEFAULT_FILE_EXTENSION: &str = "data";

/// Default stimulus channel name
pub const DEFAULT_CHANNEL_NAME: &str = "StimulusChannel";

/// Default mock device sample rate in Hz
pub const DEFAULT_MOCK_RATE_HZ: u32 = 60;

/// Default mock payload size in bytes
pub const DEFAULT_MOCK_PAYLOAD_LEN: usize = 256;

/// Recording output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory new recordings are created in
    pub output_dir: PathBuf,
    /// File extension for new recordings
    pub file_extension: String,
    /// Record layout
    pub format: RecordFormat,
    /// Prefix files with the `SCAP` format header
    pub write_header: bool,
    /// When the pending stimulus tag is cleared
    pub tag_reset: TagResetPolicy,
    /// Flush after every record
    pub flush_each_record: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_next::document_dir()
                .map(|d| d.join("stimcap"))
                .unwrap_or_else(|| PathBuf::from("recordings")),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            format: RecordFormat::Tagged,
            write_header: false,
            tag_reset: TagResetPolicy::OnRead,
            flush_each_record: true,
        }
    }
}

impl RecordingConfig {
    /// Path for a recording started at `now`
    pub fn recording_path(&self, now: DateTime<Local>) -> PathBuf {
        self.output_dir.join(format!(
            "capture_{}.{}",
            now.format("%Y%m%d_%H%M%S"),
            self.file_extension
        ))
    }
}

/// Which side of the socket this process takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Dial a socket the peer is listening on
    #[default]
    Connect,
    /// Bind the socket and wait for the peer
    Listen,
}

/// Stimulus channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Whether to open the channel at all
    pub enabled: bool,
    /// Well-known channel name shared with the peer
    pub name: String,
    /// Directory holding the socket; platform runtime dir when unset
    pub socket_dir: Option<PathBuf>,
    /// Connect or listen
    pub role: ChannelRole,
    /// Identification sent on connect
    pub greeting: String,
    /// Sent once per session on the first sample
    pub ready_sentinel: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: DEFAULT_CHANNEL_NAME.to_string(),
            socket_dir: None,
            role: ChannelRole::Connect,
            greeting: DEFAULT_GREETING.to_string(),
            ready_sentinel: DEFAULT_READY_SENTINEL.to_string(),
        }
    }
}

impl ChannelConfig {
    /// Full path of the channel socket
    pub fn socket_path(&self) -> PathBuf {
        let dir = self
            .socket_dir
            .clone()
            .or_else(dirs_next::runtime_dir)
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("{}.sock", self.name))
    }
}

/// Sample source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Sample rate of the mock device
    pub mock_rate_hz: u32,
    /// Payload size of mock samples
    pub mock_payload_len: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mock_rate_hz: DEFAULT_MOCK_RATE_HZ,
            mock_payload_len: DEFAULT_MOCK_PAYLOAD_LEN,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Write daily-rolling log files here when set
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,stimcap_rs=debug".to_string(),
            log_dir: None,
        }
    }
}
