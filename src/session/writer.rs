//! Recording writer
//!
//! Owns the output stream of one recording session and appends encoded
//! records to it in call order. Each append consumes the pending stimulus tag
//! from the shared [`StimulusState`], so a tag set by the stimulus channel is
//! attached to exactly one record.
//!
//! The writer buffers internally. The first failed write or flush discards
//! whatever is still buffered and closes the writer, so bytes of a record
//! reported as failed never reach the sink later.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RecordingConfig;
use crate::error::{Result, ResultExt, StimCapError};
use crate::stimulus::StimulusState;
use crate::types::{Timestamp, NO_STIMULUS};

use super::codec::{write_file_header, FrameCodec, FILE_HEADER_LEN};
use super::types::{RecordFormat, TagResetPolicy, WriterStats};

/// Options that shape how a writer lays out and flushes records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Record layout
    pub format: RecordFormat,
    /// Prefix the file with the `SCAP` format header
    pub write_header: bool,
    /// When the shared tag is cleared
    pub tag_reset: TagResetPolicy,
    /// Flush the stream after every record
    pub flush_each_record: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            format: RecordFormat::Tagged,
            write_header: false,
            tag_reset: TagResetPolicy::OnRead,
            flush_each_record: true,
        }
    }
}

impl From<&RecordingConfig> for WriterOptions {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            format: config.format,
            write_header: config.write_header,
            tag_reset: config.tag_reset,
            flush_each_record: config.flush_each_record,
        }
    }
}

/// Sequential writer for one recording file
#[derive(Debug)]
pub struct RecordingWriter<W: Write = File> {
    /// Buffered output stream; `None` once closed or failed
    stream: Option<BufWriter<W>>,
    /// Set when a write error discarded the stream
    failed: bool,
    /// Path of the file, if the stream is file-backed
    path: Option<PathBuf>,
    /// Record codec
    codec: FrameCodec,
    /// Shared pending stimulus tag
    stimulus: Arc<StimulusState>,
    /// Tag reset behavior on failed writes
    tag_reset: TagResetPolicy,
    /// Flush after every record
    flush_each_record: bool,
    /// Counters
    stats: WriterStats,
}

impl RecordingWriter<File> {
    /// Create or truncate `path` and open it for appending records
    pub fn open(
        path: impl AsRef<Path>,
        options: WriterOptions,
        stimulus: Arc<StimulusState>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create recording {}", path.display()))?;

        let mut writer = Self::from_writer(file, options, stimulus)?;
        writer.path = Some(path.to_path_buf());
        tracing::info!(
            "Opened recording {} ({} format)",
            path.display(),
            options.format.display_name()
        );
        Ok(writer)
    }
}

impl<W: Write> RecordingWriter<W> {
    /// Wrap an already-open stream
    pub fn from_writer(inner: W, options: WriterOptions, stimulus: Arc<StimulusState>) -> Result<Self> {
        let mut stream = BufWriter::new(inner);
        let mut stats = WriterStats::default();
        if options.write_header {
            write_file_header(&mut stream, options.format)?;
            stats.bytes_written = FILE_HEADER_LEN as u64;
        }

        Ok(Self {
            stream: Some(stream),
            failed: false,
            path: None,
            codec: FrameCodec::new(options.format),
            stimulus,
            tag_reset: options.tag_reset,
            flush_each_record: options.flush_each_record,
            stats,
        })
    }

    /// Check if the writer still accepts records
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Check if a write error closed the writer
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Path of the recording, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Counters for this session
    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Shared stimulus state this writer consumes
    pub fn stimulus(&self) -> &Arc<StimulusState> {
        &self.stimulus
    }

    /// Append one record stamped with the current time
    ///
    /// Returns the stimulus code that was attached.
    pub fn append(&mut self, payload: &[u8]) -> Result<i32> {
        self.append_at(Timestamp::now(), payload)
    }

    /// Append one record with an explicit timestamp
    pub fn append_at(&mut self, captured_at: Timestamp, payload: &[u8]) -> Result<i32> {
        let stream = self.stream.as_mut().ok_or(StimCapError::WriterClosed)?;

        let code = self.stimulus.take();
        let flush = self.flush_each_record;
        let result = match self.codec.encode(captured_at, code, payload) {
            Ok(bytes) => {
                let written = stream
                    .write_all(&bytes)
                    .and_then(|()| if flush { stream.flush() } else { Ok(()) });
                match written {
                    Ok(()) => Ok(bytes.len()),
                    Err(e) => {
                        // Nothing of this record may reach the sink later
                        self.failed = true;
                        Err(StimCapError::from(e))
                    }
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(written) => {
                self.stats.records_written += 1;
                self.stats.bytes_written += written as u64;
                if code != NO_STIMULUS {
                    self.stats.tagged_records += 1;
                    tracing::debug!("Record {} tagged with stimulus {}", self.stats.records_written, code);
                }
                Ok(code)
            }
            Err(e) => {
                self.stats.failed_writes += 1;
                if self.failed {
                    self.discard();
                }
                if self.tag_reset == TagResetPolicy::OnSuccess && code != NO_STIMULUS {
                    let restored = self.stimulus.restore(code);
                    tracing::debug!("Write failed, stimulus {} restored: {}", code, restored);
                }
                tracing::warn!("Failed to append record: {}", e);
                Err(e)
            }
        }
    }

    /// Flush buffered records without closing
    pub fn flush(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(StimCapError::WriterClosed)?;
        if let Err(e) = stream.flush() {
            self.discard();
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop the stream without writing out anything still buffered
    fn discard(&mut self) {
        if let Some(stream) = self.stream.take() {
            let (_inner, buffered) = stream.into_parts();
            let pending = buffered.map(|b| b.len()).unwrap_or(0);
            tracing::warn!("Recording writer failed, discarded {} buffered bytes", pending);
        }
        self.failed = true;
    }

    /// Flush and release the stream; calling again is a no-op
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.flush() {
                self.stream = Some(stream);
                self.discard();
                return Err(e).context("Failed to flush recording on close");
            }
            tracing::info!(
                "Closed recording{} after {} records ({} bytes)",
                self.path
                    .as_ref()
                    .map(|p| format!(" {}", p.display()))
                    .unwrap_or_default(),
                self.stats.records_written,
                self.stats.bytes_written
            );
        }
        Ok(())
    }

    /// Close and hand back the underlying stream
    pub fn into_inner(mut self) -> Result<Option<W>> {
        let Some(stream) = self.stream.take() else {
            return Ok(None);
        };
        match stream.into_inner() {
            Ok(inner) => Ok(Some(inner)),
            Err(e) => {
                let (error, stream) = e.into_parts();
                self.stream = Some(stream);
                self.discard();
                Err(error.into())
            }
        }
    }
}

impl<W: Write> Drop for RecordingWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close recording: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::codec::HEADER_MAGIC;
    use std::io::Cursor;

    fn writer(stimulus: &Arc<StimulusState>) -> RecordingWriter<Cursor<Vec<u8>>> {
        RecordingWriter::from_writer(Cursor::new(Vec::new()), WriterOptions::default(), stimulus.clone())
            .unwrap()
    }

    #[test]
    fn test_append_layout() {
        let stimulus = Arc::new(StimulusState::new());
        stimulus.set(7);
        let mut w = writer(&stimulus);
        assert_eq!(w.append_at(Timestamp::from_raw(1000), &[1, 2, 3]).unwrap(), 7);

        let bytes = w.into_inner().unwrap().unwrap().into_inner();
        assert_eq!(
            bytes,
            vec![0xE8, 0x03, 0, 0, 0, 0, 0, 0, 7, 0, 0, 0, 3, 0, 0, 0, 1, 2, 3]
        );
    }

    #[test]
    fn test_tag_consumed_once() {
        let stimulus = Arc::new(StimulusState::new());
        let mut w = writer(&stimulus);

        stimulus.set(42);
        assert_eq!(w.append(&[0]).unwrap(), 42);
        assert_eq!(stimulus.peek(), NO_STIMULUS);
        assert_eq!(w.append(&[0]).unwrap(), NO_STIMULUS);

        let stats = w.stats();
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.tagged_records, 1);
        assert_eq!(stats.bytes_written, 2 * 17);
    }

    #[test]
    fn test_header_written_first() {
        let stimulus = Arc::new(StimulusState::new());
        let options = WriterOptions {
            write_header: true,
            ..Default::default()
        };
        let w = RecordingWriter::from_writer(Vec::new(), options, stimulus).unwrap();
        let bytes = w.into_inner().unwrap().unwrap();
        assert_eq!(&bytes[..4], &HEADER_MAGIC);
        assert_eq!(bytes[4], RecordFormat::Tagged.header_byte());
    }

    #[test]
    fn test_close_is_idempotent() {
        let stimulus = Arc::new(StimulusState::new());
        let mut w = writer(&stimulus);
        w.close().unwrap();
        w.close().unwrap();
        assert!(!w.is_open());
        assert!(matches!(w.append(&[1]), Err(StimCapError::WriterClosed)));
    }

    #[test]
    fn test_append_after_close_keeps_tag() {
        let stimulus = Arc::new(StimulusState::new());
        let mut w = writer(&stimulus);
        w.close().unwrap();
        stimulus.set(3);
        assert!(w.append(&[1]).is_err());
        assert_eq!(stimulus.peek(), 3);
    }

    /// Stream that rejects every write
    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_resets_tag_on_read_policy() {
        let stimulus = Arc::new(StimulusState::new());
        let mut w = RecordingWriter::from_writer(FailingWriter, WriterOptions::default(), stimulus.clone())
            .unwrap();
        stimulus.set(11);

        let err = w.append(&[1, 2]).unwrap_err();
        assert!(matches!(err, StimCapError::Io(_)));
        assert_eq!(stimulus.peek(), NO_STIMULUS);
        assert_eq!(w.stats().failed_writes, 1);
    }

    #[test]
    fn test_failed_write_restores_tag_on_success_policy() {
        let stimulus = Arc::new(StimulusState::new());
        let options = WriterOptions {
            tag_reset: TagResetPolicy::OnSuccess,
            ..Default::default()
        };
        let mut w = RecordingWriter::from_writer(FailingWriter, options, stimulus.clone()).unwrap();
        stimulus.set(11);

        assert!(w.append(&[1, 2]).is_err());
        assert_eq!(stimulus.peek(), 11);
    }

    /// Shared sink whose next write fails once when armed
    #[derive(Clone, Default)]
    struct FlakySink {
        written: Arc<std::sync::Mutex<Vec<u8>>>,
        fail_next: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "transient"));
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn assert_failed_record_never_written(policy: TagResetPolicy) {
        let stimulus = Arc::new(StimulusState::new());
        let sink = FlakySink::default();
        sink.fail_next.store(true, std::sync::atomic::Ordering::SeqCst);
        let options = WriterOptions {
            tag_reset: policy,
            ..Default::default()
        };
        let mut w = RecordingWriter::from_writer(sink.clone(), options, stimulus.clone()).unwrap();

        stimulus.set(5);
        assert!(matches!(w.append(b"A"), Err(StimCapError::Io(_))));
        assert!(w.has_failed());
        assert!(!w.is_open());

        // The writer stays closed; the failed record is not written on retry or close
        assert!(matches!(w.append(b"B"), Err(StimCapError::WriterClosed)));
        assert!(matches!(w.flush(), Err(StimCapError::WriterClosed)));
        w.close().unwrap();
        drop(w);
        assert!(sink.written.lock().unwrap().is_empty());

        let expected = match policy {
            TagResetPolicy::OnRead => NO_STIMULUS,
            TagResetPolicy::OnSuccess => 5,
        };
        assert_eq!(stimulus.peek(), expected);
    }

    #[test]
    fn test_failed_flush_discards_record_on_read_policy() {
        assert_failed_record_never_written(TagResetPolicy::OnRead);
    }

    #[test]
    fn test_failed_flush_discards_record_on_success_policy() {
        assert_failed_record_never_written(TagResetPolicy::OnSuccess);
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("capture.data");
        let err = RecordingWriter::open(&path, WriterOptions::default(), Arc::new(StimulusState::new()))
            .unwrap_err();
        assert!(matches!(err.root(), StimCapError::Io(_)));
    }

    #[test]
    fn test_open_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.data");
        std::fs::write(&path, vec![0xFF; 64]).unwrap();

        let mut w = RecordingWriter::open(&path, WriterOptions::default(), Arc::new(StimulusState::new()))
            .unwrap();
        w.append_at(Timestamp::ZERO, &[5]).unwrap();
        w.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 17);
        assert_eq!(w.path(), Some(path.as_path()));
    }
}
