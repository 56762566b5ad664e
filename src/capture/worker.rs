//! Capture worker thread
//!
//! This module contains the loop that turns device samples into records. It
//! runs on its own thread and is the only place a [`RecordingWriter`] is
//! touched, so appends and close are serialized by construction.
//!
//! # Responsibilities
//!
//! - **Command processing**: start, pause, resume and stop recordings
//! - **Sample handling**: fetch each announced sample and append it with the
//!   pending stimulus tag
//! - **Ready sentinel**: tell the stimulus peer when the first sample arrives
//! - **Error handling**: an I/O failure aborts the recording session and is
//!   reported to the operator; it is never retried

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::error::Result;
use crate::session::{RecordingWriter, SessionState, WriterOptions, WriterStats};
use crate::stimulus::StimulusState;

use super::device::{DeviceEvent, MotionDevice};
use super::{CaptureCommand, CaptureMessage, CaptureStats};

/// Device notifications queued while an append is in progress
pub const DEVICE_QUEUE_CAPACITY: usize = 1024;

/// Receives a call for every device sample
///
/// The stimulus channel implements this to send its ready sentinel once per
/// session.
pub trait SampleNotifier: Send + Sync {
    /// Returns `true` if this call produced an outbound notification
    fn notify_sample(&self) -> Result<bool>;
}

#[cfg(unix)]
impl SampleNotifier for crate::stimulus::StimulusChannel {
    fn notify_sample(&self) -> Result<bool> {
        crate::stimulus::StimulusChannel::notify_sample(self)
    }
}

/// The worker that owns the device and the active recording
pub struct CaptureWorker {
    /// Sample source
    device: Box<dyn MotionDevice>,
    /// Shared pending stimulus tag
    stimulus: Arc<StimulusState>,
    /// Options for each new recording
    options: WriterOptions,
    /// Told about every sample
    notifier: Option<Arc<dyn SampleNotifier>>,
    /// Command receiver from the operator
    command_rx: Receiver<CaptureCommand>,
    /// Message sender to the operator
    message_tx: Sender<CaptureMessage>,
    /// Device event sender handed to the device on subscribe
    device_tx: Sender<DeviceEvent>,
    /// Device event receiver
    device_rx: Receiver<DeviceEvent>,
    /// Cleared to leave the main loop
    running: bool,
    /// Active recording
    writer: Option<RecordingWriter>,
    /// Recording state
    state: SessionState,
    /// Counters across all recordings
    stats: CaptureStats,
    /// Writer counters of finished recordings
    finished: WriterStats,
}

impl CaptureWorker {
    /// Create a new capture worker
    pub fn new(
        device: Box<dyn MotionDevice>,
        stimulus: Arc<StimulusState>,
        options: WriterOptions,
        command_rx: Receiver<CaptureCommand>,
        message_tx: Sender<CaptureMessage>,
    ) -> Self {
        let (device_tx, device_rx) = bounded(DEVICE_QUEUE_CAPACITY);
        Self {
            device,
            stimulus,
            options,
            notifier: None,
            command_rx,
            message_tx,
            device_tx,
            device_rx,
            running: true,
            writer: None,
            state: SessionState::Idle,
            stats: CaptureStats::default(),
            finished: WriterStats::default(),
        }
    }

    /// Attach a sample notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn SampleNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Current recording state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Capture worker started with {}", self.device.name());

        if let Err(e) = self.device.subscribe(self.device_tx.clone()) {
            tracing::error!("Failed to subscribe to device: {}", e);
            self.emit(CaptureMessage::Error(format!("Device subscribe failed: {}", e)));
            self.running = false;
        }

        let command_rx = self.command_rx.clone();
        let device_rx = self.device_rx.clone();
        while self.running {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => {
                        tracing::debug!("Capture handle dropped");
                        self.running = false;
                    }
                },
                recv(device_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_device_event(event);
                    }
                }
            }
        }

        // Cleanup
        self.stop_recording();
        self.device.unsubscribe();

        self.emit(CaptureMessage::Shutdown);
        tracing::info!("Capture worker stopped");
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: CaptureCommand) {
        match cmd {
            CaptureCommand::StartRecording(path) => self.start_recording(path),
            CaptureCommand::PauseRecording => {
                if self.state.is_recording() {
                    self.set_state(SessionState::Paused);
                } else {
                    tracing::debug!("Pause ignored while {}", self.state.display_name());
                }
            }
            CaptureCommand::ResumeRecording => {
                if self.state.is_paused() {
                    self.set_state(SessionState::Recording);
                } else {
                    tracing::debug!("Resume ignored while {}", self.state.display_name());
                }
            }
            CaptureCommand::StopRecording => self.stop_recording(),
            CaptureCommand::RequestStats => {
                let stats = self.stats_snapshot();
                self.emit(CaptureMessage::Stats(stats));
            }
            CaptureCommand::Shutdown => {
                self.running = false;
            }
        }
    }

    /// Handle a notification from the device
    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected => {
                tracing::info!("Device connected");
                self.emit(CaptureMessage::DeviceConnected);
            }
            DeviceEvent::Disconnected => {
                tracing::warn!("Device disconnected");
                self.emit(CaptureMessage::DeviceDisconnected);
            }
            DeviceEvent::SampleReady => self.handle_sample(),
        }
    }

    fn handle_sample(&mut self) {
        self.stats.samples_seen += 1;

        if let Some(notifier) = &self.notifier {
            match notifier.notify_sample() {
                Ok(true) => self.emit(CaptureMessage::ReadySent),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to send ready notification: {}", e);
                    self.emit(CaptureMessage::Error(e.to_string()));
                }
            }
        }

        if !self.state.is_recording() {
            return;
        }

        let sample = match self.device.current_sample() {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.device_errors += 1;
                tracing::warn!("Failed to fetch sample: {}", e);
                return;
            }
        };

        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        match writer.append(&sample.serialize()) {
            Ok(code) => {
                if code != crate::types::NO_STIMULUS {
                    self.emit(CaptureMessage::StimulusRecorded {
                        code,
                        sample_id: sample.id(),
                    });
                }
            }
            Err(e) => {
                tracing::error!("Recording aborted: {}", e);
                self.abort_recording();
                self.emit(CaptureMessage::RecordingAborted(e.to_string()));
            }
        }
    }

    fn start_recording(&mut self, path: PathBuf) {
        if self.writer.is_some() {
            self.stop_recording();
        }

        match RecordingWriter::open(&path, self.options, self.stimulus.clone()) {
            Ok(writer) => {
                self.writer = Some(writer);
                self.stats.sessions += 1;
                self.state = SessionState::Recording;
                self.emit(CaptureMessage::RecordingStarted(path));
            }
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.emit(CaptureMessage::Error(e.to_string()));
            }
        }
    }

    fn stop_recording(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let path = writer.path().map(|p| p.to_path_buf());
        let result = writer.close();
        let stats = writer.stats();
        self.finish(stats);

        match result {
            Ok(()) => {
                self.state = SessionState::Stopped;
                self.emit(CaptureMessage::RecordingStopped { path, stats });
            }
            Err(e) => {
                tracing::error!("Failed to close recording: {}", e);
                self.state = SessionState::Stopped;
                self.emit(CaptureMessage::RecordingAborted(e.to_string()));
            }
        }
    }

    fn abort_recording(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                tracing::debug!("Close after failed write: {}", e);
            }
            self.finish(writer.stats());
        }
        self.state = SessionState::Stopped;
    }

    fn finish(&mut self, stats: WriterStats) {
        self.finished.records_written += stats.records_written;
        self.finished.bytes_written += stats.bytes_written;
        self.finished.tagged_records += stats.tagged_records;
        self.finished.failed_writes += stats.failed_writes;
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::info!("Recording {}", state.display_name().to_lowercase());
        self.state = state;
        self.emit(CaptureMessage::StateChanged(state));
    }

    /// Counters including the active recording
    fn stats_snapshot(&self) -> CaptureStats {
        let active = self.writer.as_ref().map(|w| w.stats()).unwrap_or_default();
        CaptureStats {
            records_written: self.finished.records_written + active.records_written,
            bytes_written: self.finished.bytes_written + active.bytes_written,
            tagged_records: self.finished.tagged_records + active.tagged_records,
            write_failures: self.finished.failed_writes + active.failed_writes,
            ..self.stats
        }
    }

    fn emit(&self, msg: CaptureMessage) {
        match self.message_tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                tracing::debug!("Capture message queue full, dropped {:?}", msg);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
