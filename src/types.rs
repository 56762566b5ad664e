//! Core data types for StimCap-RS
//!
//! This module contains the fundamental data structures shared by the
//! recording format, the capture loop and the stimulus channel.
//!
//! # Main Types
//!
//! - [`Timestamp`] - Raw 64-bit capture time as stored on disk
//! - [`Record`] - One persisted unit: timestamp, stimulus code, opaque payload
//! - [`ConnectionStatus`] - State of the stimulus channel connection
//!
//! # Timestamps
//!
//! Recordings store the producer's "binary date": a count of 100 ns ticks
//! since 0001-01-01T00:00:00 in the low 62 bits, with the top two bits holding
//! the date kind (unspecified, UTC or local). [`Timestamp`] keeps the raw value
//! untouched so files round-trip bit-for-bit, and converts to
//! [`chrono::DateTime`] on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally injected marker attached to the next record
pub type StimulusCode = i32;

/// Stimulus code meaning "no tag"
pub const NO_STIMULUS: StimulusCode = 0;

/// Number of 100 ns ticks per second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01 and the Unix epoch
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Largest representable tick count (9999-12-31T23:59:59.9999999)
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

const TICKS_PER_DAY: i64 = 864_000_000_000;
const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;
const KIND_UTC: u64 = 0x4000_0000_0000_0000;
const KIND_LOCAL: u64 = 0x8000_0000_0000_0000;
const LOCAL_TICKS_CEILING: i64 = 0x4000_0000_0000_0000;

/// Kind bits carried in the top of a [`Timestamp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    /// No kind recorded; ticks are treated as UTC
    Unspecified,
    /// Ticks are UTC
    Utc,
    /// Local time, stored as UTC ticks (possibly wrapped below the ceiling)
    Local,
}

/// Raw capture timestamp as written to a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Timestamp with all bits clear, used for records without time information
    pub const ZERO: Timestamp = Timestamp(0);

    /// Current wall-clock time, UTC kind
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Encode a UTC date, clamping to the representable tick range
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let ticks = dt
            .timestamp()
            .checked_mul(TICKS_PER_SECOND)
            .and_then(|t| t.checked_add(i64::from(dt.timestamp_subsec_nanos() / 100)))
            .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
            .unwrap_or(if dt.timestamp() < 0 { 0 } else { MAX_TICKS })
            .clamp(0, MAX_TICKS);
        Timestamp((ticks as u64 | KIND_UTC) as i64)
    }

    /// Wrap a raw stored value
    pub fn from_raw(raw: i64) -> Self {
        Timestamp(raw)
    }

    /// The raw stored value, kind bits included
    pub fn raw(&self) -> i64 {
        self.0
    }

    /// The date kind encoded in the top bits
    pub fn kind(&self) -> DateKind {
        let bits = self.0 as u64;
        if bits & KIND_LOCAL != 0 {
            DateKind::Local
        } else if bits & KIND_UTC != 0 {
            DateKind::Utc
        } else {
            DateKind::Unspecified
        }
    }

    /// UTC tick count since 0001-01-01
    pub fn ticks(&self) -> i64 {
        let bits = self.0 as u64;
        match self.kind() {
            DateKind::Local => {
                let ticks = (bits & !KIND_LOCAL) as i64;
                if ticks > LOCAL_TICKS_CEILING - TICKS_PER_DAY {
                    ticks - LOCAL_TICKS_CEILING
                } else {
                    ticks
                }
            }
            DateKind::Utc | DateKind::Unspecified => (bits & TICKS_MASK) as i64,
        }
    }

    /// Decode to a UTC date, if the ticks fall inside chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let since_unix = self.ticks() - UNIX_EPOCH_TICKS;
        let secs = since_unix.div_euclid(TICKS_PER_SECOND);
        let nanos = (since_unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
            None => write!(f, "raw:{}", self.0),
        }
    }
}

/// One persisted unit of a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Producer-assigned capture time
    pub captured_at: Timestamp,
    /// Stimulus tag; [`NO_STIMULUS`] means untagged
    pub stimulus_code: StimulusCode,
    /// Opaque serialized sample from the device
    pub payload: Vec<u8>,
}

impl Record {
    /// Create a new record
    pub fn new(captured_at: Timestamp, stimulus_code: StimulusCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            captured_at,
            stimulus_code,
            payload: payload.into(),
        }
    }

    /// Check if the record carries a stimulus tag
    pub fn is_tagged(&self) -> bool {
        self.stimulus_code != NO_STIMULUS
    }

    /// Length of the opaque payload in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Connection status of the stimulus channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No peer connected
    #[default]
    Disconnected,
    /// Connected and receiving
    Connected,
    /// The transport failed; no reconnect is attempted
    Error,
}

impl ConnectionStatus {
    /// Display name for the status
    pub fn display_name(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}
