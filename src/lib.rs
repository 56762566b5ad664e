//! # StimCap-RS: Stimulus-tagged Motion Capture Recorder
//!
//! Records motion-capture samples to a framed binary file, tagging each record
//! with the stimulus code an external presentation program most recently
//! announced over a local IPC channel. Recordings can be replayed record by
//! record for offline analysis.
//!
//! ## Architecture
//!
//! - **Session**: Record codec, recording writer and recording reader
//! - **Stimulus**: Shared pending tag plus the channel that sets it
//! - **Capture**: Worker thread that turns device samples into records
//! - **Communication**: Crossbeam channels for thread-safe message passing
//!
//! ## Record Format
//!
//! Each record is laid out little-endian with no padding:
//!
//! ```text
//! int64 timestamp | int32 stimulus_code | int32 payload_length | payload
//! ```
//!
//! ## Configuration
//!
//! Settings are stored as TOML in the platform-appropriate config directory
//! under `dev.hxyulin.stimcap-rs`:
//!
//! - **Linux**: `~/.config/dev.hxyulin.stimcap-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.stimcap-rs/config.toml`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stimcap_rs::{
//!     capture::{CaptureHandle, MockDevice},
//!     config::AppConfig,
//!     session::WriterOptions,
//!     stimulus::{StimulusChannel, StimulusState},
//! };
//!
//! let config = AppConfig::load_or_default();
//! let stimulus = Arc::new(StimulusState::new());
//! let channel = Arc::new(StimulusChannel::connect(&config.channel, stimulus.clone())?);
//!
//! let (capture, worker) = CaptureHandle::spawn(
//!     Box::new(MockDevice::from_config(&config.device)),
//!     stimulus,
//!     WriterOptions::from(&config.recording),
//!     Some(channel),
//! )?;
//!
//! capture.start_recording(config.recording_path(chrono::Local::now()));
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod session;
pub mod stimulus;
pub mod types;

// Re-export commonly used types
pub use capture::{CaptureCommand, CaptureHandle, CaptureMessage, CaptureStats};
pub use config::AppConfig;
pub use error::{Result, StimCapError};
pub use session::{FrameCodec, RecordFormat, RecordingReader, RecordingWriter};
pub use stimulus::StimulusState;
pub use types::{Record, StimulusCode, Timestamp};
