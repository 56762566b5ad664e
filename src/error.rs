//! Error handling for StimCap-RS
//!
//! This module defines the error taxonomy shared by the codec, the recording
//! writer/reader, the stimulus channel and the capture loop, together with a
//! Result alias for use throughout the crate.

use thiserror::Error;

/// Main error type for StimCap-RS operations
#[derive(Error, Debug)]
pub enum StimCapError {
    /// File open/write/flush/close failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record ended before all of its bytes were available
    #[error("Truncated record: {field} needs {expected} bytes, only {available} available")]
    TruncatedRecord {
        /// Field that could not be read in full
        field: &'static str,
        /// Bytes the field requires
        expected: usize,
        /// Bytes that were actually left in the stream
        available: usize,
    },

    /// A numeric stimulus code that is negative or out of range
    #[error("Invalid stimulus code: {0}")]
    InvalidStimulusCode(i64),

    /// Transport-level send/receive failures on the stimulus channel
    #[error("Channel error: {0}")]
    Channel(String),

    /// A record whose declared length cannot be valid
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Payload longer than the 32-bit length prefix can describe
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Append or flush attempted on a writer that was already closed
    #[error("Recording writer is closed")]
    WriterClosed,

    /// A file header that carries the magic but an unknown format byte
    #[error("Invalid recording header: {0}")]
    InvalidHeader(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StimCapError>,
    },
}

impl StimCapError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StimCapError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with any context layers peeled off
    pub fn root(&self) -> &StimCapError {
        match self {
            StimCapError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error (or the error it wraps) is a truncated record
    pub fn is_truncated(&self) -> bool {
        matches!(self.root(), StimCapError::TruncatedRecord { .. })
    }
}

/// Result type alias for StimCap-RS operations
pub type Result<T> = std::result::Result<T, StimCapError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| StimCapError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StimCapError::Io(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StimCapError::InvalidStimulusCode(-5);
        assert_eq!(err.to_string(), "Invalid stimulus code: -5");
    }

    #[test]
    fn test_error_with_context() {
        let err = StimCapError::Channel("broken pipe".to_string());
        let with_ctx = err.with_context("Failed to send greeting");
        assert!(with_ctx.to_string().contains("Failed to send greeting"));
        assert!(with_ctx.to_string().contains("broken pipe"));
    }

    #[test]
    fn test_truncated_record_display() {
        let err = StimCapError::TruncatedRecord {
            field: "payload",
            expected: 3,
            available: 2,
        };
        assert!(err.to_string().contains("payload"));
        assert!(err.to_string().contains("needs 3 bytes"));
        assert!(err.is_truncated());
    }

    #[test]
    fn test_root_peels_context() {
        let err = StimCapError::TruncatedRecord {
            field: "timestamp",
            expected: 8,
            available: 4,
        }
        .with_context("record 12")
        .with_context("reading capture.data");
        assert!(err.is_truncated());
        assert!(matches!(err.root(), StimCapError::TruncatedRecord { .. }));
    }

    #[test]
    fn test_io_result_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = res.context("Failed to open recording").unwrap_err();
        assert!(matches!(err.root(), StimCapError::Io(_)));
        assert!(err.to_string().starts_with("Failed to open recording"));
    }
}
