//! Session data types

use serde::{Deserialize, Serialize};

use crate::error::StimCapError;
use crate::types::{Record, Timestamp};

/// State of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active session
    #[default]
    Idle,
    /// Appending every sample to the open recording
    Recording,
    /// Recording file is open but samples are skipped
    Paused,
    /// Session closed, file flushed
    Stopped,
}

impl SessionState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Check if paused
    pub fn is_paused(&self) -> bool {
        matches!(self, SessionState::Paused)
    }

    /// Check if a recording file is currently open
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Paused)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
            SessionState::Paused => "Paused",
            SessionState::Stopped => "Stopped",
        }
    }
}

/// On-disk record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// `i32 payload_length | payload`
    Legacy,
    /// `i64 timestamp | i32 stimulus_code | i32 payload_length | payload`
    #[default]
    Tagged,
}

impl RecordFormat {
    /// Format byte used in the optional file header
    pub fn header_byte(&self) -> u8 {
        match self {
            RecordFormat::Legacy => 1,
            RecordFormat::Tagged => 2,
        }
    }

    /// Parse a header format byte
    pub fn from_header_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(RecordFormat::Legacy),
            2 => Some(RecordFormat::Tagged),
            _ => None,
        }
    }

    /// Bytes preceding the payload in each record
    pub fn record_header_len(&self) -> usize {
        match self {
            RecordFormat::Legacy => 4,
            RecordFormat::Tagged => 8 + 4 + 4,
        }
    }

    /// Display name for the format
    pub fn display_name(&self) -> &'static str {
        match self {
            RecordFormat::Legacy => "legacy",
            RecordFormat::Tagged => "tagged",
        }
    }
}

impl std::str::FromStr for RecordFormat {
    type Err = StimCapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(RecordFormat::Legacy),
            "tagged" => Ok(RecordFormat::Tagged),
            other => Err(StimCapError::Config(format!("Unknown record format: {}", other))),
        }
    }
}

/// When the shared stimulus tag is cleared relative to the write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagResetPolicy {
    /// Cleared as soon as the writer reads it; a failed write loses the tag
    #[default]
    OnRead,
    /// Restored after a failed write unless a newer tag arrived meanwhile
    OnSuccess,
}

/// Counters kept by a recording writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Records successfully appended
    pub records_written: u64,
    /// Bytes successfully appended, header included
    pub bytes_written: u64,
    /// Appended records that carried a stimulus tag
    pub tagged_records: u64,
    /// Appends that failed
    pub failed_writes: u64,
}

/// Result of a lenient read: everything decoded before the first failure
#[derive(Debug)]
pub struct ReadOutcome {
    /// Records decoded in file order
    pub records: Vec<Record>,
    /// The error that stopped the read, if any
    pub error: Option<StimCapError>,
}

impl ReadOutcome {
    /// Check if the whole file decoded cleanly
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate view over a decoded recording
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordingSummary {
    /// Number of records
    pub record_count: usize,
    /// Records carrying a nonzero stimulus code
    pub tagged_count: usize,
    /// Sum of payload lengths
    pub payload_bytes: u64,
    /// Timestamp of the first record
    pub first_timestamp: Option<Timestamp>,
    /// Timestamp of the last record
    pub last_timestamp: Option<Timestamp>,
}

impl RecordingSummary {
    /// Summarize a slice of records
    pub fn from_records(records: &[Record]) -> Self {
        Self {
            record_count: records.len(),
            tagged_count: records.iter().filter(|r| r.is_tagged()).count(),
            payload_bytes: records.iter().map(|r| r.payload.len() as u64).sum(),
            first_timestamp: records.first().map(|r| r.captured_at),
            last_timestamp: records.last().map(|r| r.captured_at),
        }
    }

    /// Wall-clock span between first and last record
    pub fn duration(&self) -> Option<chrono::Duration> {
        let first = self.first_timestamp?.to_datetime()?;
        let last = self.last_timestamp?.to_datetime()?;
        Some(last - first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_STIMULUS;

    #[test]
    fn test_session_state() {
        assert!(SessionState::Recording.is_recording());
        assert!(SessionState::Paused.is_paused());
        assert!(SessionState::Paused.is_open());
        assert!(!SessionState::Stopped.is_open());
        assert!(!SessionState::Idle.is_recording());
    }

    #[test]
    fn test_record_format_parsing() {
        assert_eq!("Tagged".parse::<RecordFormat>().unwrap(), RecordFormat::Tagged);
        assert_eq!("legacy".parse::<RecordFormat>().unwrap(), RecordFormat::Legacy);
        assert!("v4".parse::<RecordFormat>().is_err());
    }

    #[test]
    fn test_header_byte_roundtrip() {
        for format in [RecordFormat::Legacy, RecordFormat::Tagged] {
            assert_eq!(RecordFormat::from_header_byte(format.header_byte()), Some(format));
        }
        assert_eq!(RecordFormat::from_header_byte(0), None);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            Record::new(Timestamp::from_raw(10_000_000), NO_STIMULUS, vec![0; 4]),
            Record::new(Timestamp::from_raw(20_000_000), 9, vec![0; 6]),
            Record::new(Timestamp::from_raw(40_000_000), NO_STIMULUS, Vec::new()),
        ];
        let summary = RecordingSummary::from_records(&records);
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.tagged_count, 1);
        assert_eq!(summary.payload_bytes, 10);
        assert_eq!(summary.duration(), Some(chrono::Duration::seconds(3)));
    }

    #[test]
    fn test_empty_summary() {
        let summary = RecordingSummary::from_records(&[]);
        assert_eq!(summary.record_count, 0);
        assert_eq!(summary.duration(), None);
    }
}
