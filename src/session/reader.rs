//! Recording reader
//!
//! Replays a recording file as a lazy sequence of records in file order.
//! Reading is strictly sequential and stops at the first error: a record cut
//! short at the end of the file is reported as
//! [`StimCapError::TruncatedRecord`] rather than silently dropped. Callers
//! that want everything before a damaged tail can use [`read_lenient`].

use std::fs::File;
use std::io::{BufReader, Chain, Cursor, Read};
use std::path::Path;

use crate::error::{Result, ResultExt, StimCapError};
use crate::types::Record;

use super::codec::{parse_file_header, read_up_to, FrameCodec, FILE_HEADER_LEN};
use super::types::{ReadOutcome, RecordFormat};

/// Sequential record reader over any byte stream
pub struct RecordingReader<R: Read> {
    /// Stream with any non-header prefix bytes pushed back in front
    inner: Chain<Cursor<Vec<u8>>, R>,
    /// Codec for the detected or configured layout
    codec: FrameCodec,
    /// Whether the stream began with a format header
    has_header: bool,
    /// Records yielded so far
    records_read: usize,
    /// Set after EOF or the first error
    finished: bool,
}

impl RecordingReader<BufReader<File>> {
    /// Open a recording file
    ///
    /// `format` is used only when the file has no `SCAP` header.
    pub fn open(path: impl AsRef<Path>, format: RecordFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        let reader = Self::new(BufReader::new(file), format)?;
        tracing::debug!(
            "Reading {} as {} format{}",
            path.display(),
            reader.format().display_name(),
            if reader.has_header() { " (from header)" } else { "" }
        );
        Ok(reader)
    }
}

impl<R: Read> RecordingReader<R> {
    /// Wrap a stream, detecting an optional format header
    pub fn new(mut inner: R, format: RecordFormat) -> Result<Self> {
        let mut prefix = vec![0u8; FILE_HEADER_LEN];
        let filled = read_up_to(&mut inner, &mut prefix)?;
        prefix.truncate(filled);

        let (format, has_header) = match parse_file_header(&prefix)? {
            Some(detected) => {
                prefix.clear();
                (detected, true)
            }
            None => (format, false),
        };

        Ok(Self {
            inner: Cursor::new(prefix).chain(inner),
            codec: FrameCodec::new(format),
            has_header,
            records_read: 0,
            finished: false,
        })
    }

    /// Layout used for decoding
    pub fn format(&self) -> RecordFormat {
        self.codec.format()
    }

    /// Check if the stream carried a format header
    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Records decoded so far
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Decode the next record; `Ok(None)` at end of stream
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.finished {
            return Ok(None);
        }
        match self.codec.decode_next(&mut self.inner) {
            Ok(Some(record)) => {
                self.records_read += 1;
                Ok(Some(record))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                tracing::warn!("Recording unreadable after {} records: {}", self.records_read, e);
                Err(e)
            }
        }
    }

    /// Drain the stream, keeping whatever decoded before a failure
    pub fn read_lenient(mut self) -> ReadOutcome {
        let mut records = Vec::new();
        loop {
            match self.next_record() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => return ReadOutcome { records, error: None },
                Err(e) => {
                    return ReadOutcome {
                        records,
                        error: Some(e),
                    }
                }
            }
        }
    }
}

impl<R: Read> Iterator for RecordingReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Read every record of a file, failing on any damaged record
pub fn read_all(path: impl AsRef<Path>, format: RecordFormat) -> Result<Vec<Record>> {
    RecordingReader::open(path, format)?.collect()
}

/// Read a file, returning the records decoded before any failure
///
/// Only a failure to open the file is returned as `Err`.
pub fn read_lenient(path: impl AsRef<Path>, format: RecordFormat) -> Result<ReadOutcome> {
    Ok(RecordingReader::open(path, format)?.read_lenient())
}

/// Read a file, dropping a truncated final record
///
/// Other decode errors are still returned.
pub fn read_ignoring_truncated_tail(path: impl AsRef<Path>, format: RecordFormat) -> Result<Vec<Record>> {
    let outcome = read_lenient(path, format)?;
    match outcome.error {
        None => Ok(outcome.records),
        Some(e) if e.is_truncated() => {
            tracing::info!("Ignoring truncated tail after {} records", outcome.records.len());
            Ok(outcome.records)
        }
        Some(e) => Err(e),
    }
}

impl<R: Read> std::fmt::Debug for RecordingReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingReader")
            .field("format", &self.codec.format())
            .field("has_header", &self.has_header)
            .field("records_read", &self.records_read)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Check if an error ended a read on a damaged record rather than I/O
pub fn is_decode_error(err: &StimCapError) -> bool {
    matches!(
        err.root(),
        StimCapError::TruncatedRecord { .. } | StimCapError::CorruptRecord(_)
    )
}
