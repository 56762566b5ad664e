//! Capture loop
//!
//! This module runs the recording pipeline on a dedicated worker thread and
//! talks to the operator through crossbeam channels.
//!
//! # Architecture
//!
//! - [`CaptureCommand`] - Messages sent from the operator to the worker
//! - [`CaptureMessage`] - Messages sent from the worker to the operator
//! - [`CaptureHandle`] - Operator-side handle for sending commands and receiving messages
//! - [`CaptureWorker`] - Worker loop that owns the device and the active recording
//!
//! Device notifications and operator commands are both delivered to the
//! worker as channel messages and handled one at a time, so no writer state
//! is ever shared between threads. The only shared state is the pending
//! stimulus tag, which the stimulus channel sets and the writer takes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stimcap_rs::capture::{mock_device::MockDevice, CaptureHandle};
//! use stimcap_rs::session::WriterOptions;
//! use stimcap_rs::stimulus::StimulusState;
//!
//! let stimulus = Arc::new(StimulusState::new());
//! let device = Box::new(MockDevice::new(60, 256));
//! let (capture, worker) = CaptureHandle::spawn(device, stimulus, WriterOptions::default(), None)?;
//!
//! capture.start_recording("capture.data".into());
//! // ...
//! capture.stop_recording();
//! capture.shutdown();
//! worker.join().ok();
//! ```

pub mod device;
#[cfg(feature = "mock-device")]
pub mod mock_device;
pub mod worker;

pub use device::{BytesSample, DeviceEvent, MotionDevice, Sample};
#[cfg(feature = "mock-device")]
pub use mock_device::{MockDevice, MockDeviceHandle};
pub use worker::{CaptureWorker, SampleNotifier};

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;

use crate::error::Result;
use crate::session::{SessionState, WriterOptions, WriterStats};
use crate::stimulus::StimulusState;
use crate::types::StimulusCode;

/// Message sent from the operator to the capture worker
#[derive(Debug, Clone)]
pub enum CaptureCommand {
    /// Open a new recording at the path, closing any active one
    StartRecording(PathBuf),
    /// Keep the file open but stop appending samples
    PauseRecording,
    /// Resume appending samples
    ResumeRecording,
    /// Close the active recording
    StopRecording,
    /// Request current statistics
    RequestStats,
    /// Stop the worker
    Shutdown,
}

/// Message sent from the capture worker to the operator
#[derive(Debug, Clone)]
pub enum CaptureMessage {
    /// The device became available
    DeviceConnected,
    /// The device went away
    DeviceDisconnected,
    /// The stimulus peer was told the first sample arrived
    ReadySent,
    /// A recording was opened
    RecordingStarted(PathBuf),
    /// Recording was paused or resumed
    StateChanged(SessionState),
    /// A record carrying a stimulus tag was written
    StimulusRecorded {
        code: StimulusCode,
        sample_id: u64,
    },
    /// A recording was closed normally
    RecordingStopped {
        path: Option<PathBuf>,
        stats: WriterStats,
    },
    /// A recording ended on an I/O failure
    RecordingAborted(String),
    /// Non-fatal error
    Error(String),
    /// Statistics update
    Stats(CaptureStats),
    /// Worker is shutting down
    Shutdown,
}

/// Counters across the worker's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Sample notifications received
    pub samples_seen: u64,
    /// Records appended
    pub records_written: u64,
    /// Bytes appended
    pub bytes_written: u64,
    /// Appended records that carried a stimulus tag
    pub tagged_records: u64,
    /// Appends that failed
    pub write_failures: u64,
    /// Samples the device failed to deliver
    pub device_errors: u64,
    /// Recordings opened
    pub sessions: u64,
}

/// Operator-side handle to a capture worker
pub struct CaptureHandle {
    /// Receiver for worker messages
    pub receiver: Receiver<CaptureMessage>,
    /// Sender for commands to the worker
    pub command_sender: Sender<CaptureCommand>,
}

impl CaptureHandle {
    /// Create a worker and the handle that drives it
    pub fn new(
        device: Box<dyn MotionDevice>,
        stimulus: Arc<StimulusState>,
        options: WriterOptions,
    ) -> (CaptureWorker, Self) {
        let (cmd_tx, cmd_rx) = bounded(256);
        // Bounded so an operator that stops draining cannot grow memory without limit
        let (msg_tx, msg_rx) = bounded(10_000);

        let worker = CaptureWorker::new(device, stimulus, options, cmd_rx, msg_tx);
        let handle = Self {
            receiver: msg_rx,
            command_sender: cmd_tx,
        };
        (worker, handle)
    }

    /// Start a worker on its own thread
    pub fn spawn(
        device: Box<dyn MotionDevice>,
        stimulus: Arc<StimulusState>,
        options: WriterOptions,
        notifier: Option<Arc<dyn SampleNotifier>>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (mut worker, handle) = Self::new(device, stimulus, options);
        if let Some(notifier) = notifier {
            worker = worker.with_notifier(notifier);
        }
        let thread = std::thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || worker.run())?;
        Ok((handle, thread))
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<CaptureMessage> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CaptureMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<CaptureMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send a command to the worker
    pub fn send_command(&self, cmd: CaptureCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Open a new recording
    pub fn start_recording(&self, path: PathBuf) {
        let _ = self.command_sender.send(CaptureCommand::StartRecording(path));
    }

    /// Pause the active recording
    pub fn pause_recording(&self) {
        let _ = self.command_sender.send(CaptureCommand::PauseRecording);
    }

    /// Resume a paused recording
    pub fn resume_recording(&self) {
        let _ = self.command_sender.send(CaptureCommand::ResumeRecording);
    }

    /// Close the active recording
    pub fn stop_recording(&self) {
        let _ = self.command_sender.send(CaptureCommand::StopRecording);
    }

    /// Ask for a [`CaptureMessage::Stats`] update
    pub fn request_stats(&self) {
        let _ = self.command_sender.send(CaptureCommand::RequestStats);
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(CaptureCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::MockMotionDevice;

    fn idle_device() -> Box<dyn MotionDevice> {
        let mut device = MockMotionDevice::new();
        device.expect_name().return_const("idle".to_string());
        device.expect_subscribe().returning(|_| Ok(()));
        device.expect_unsubscribe().return_const(());
        Box::new(device)
    }

    #[test]
    fn test_handle_commands_queue() {
        let (_worker, handle) = CaptureHandle::new(
            idle_device(),
            Arc::new(StimulusState::new()),
            WriterOptions::default(),
        );
        assert!(handle.send_command(CaptureCommand::RequestStats));
        handle.pause_recording();
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn test_commands_fail_after_worker_dropped() {
        let (worker, handle) = CaptureHandle::new(
            idle_device(),
            Arc::new(StimulusState::new()),
            WriterOptions::default(),
        );
        drop(worker);
        assert!(!handle.send_command(CaptureCommand::Shutdown));
    }

    #[test]
    fn test_spawned_worker_reports_stats() {
        let (handle, thread) = CaptureHandle::spawn(
            idle_device(),
            Arc::new(StimulusState::new()),
            WriterOptions::default(),
            None,
        )
        .unwrap();

        handle.request_stats();
        let msg = handle.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(msg, CaptureMessage::Stats(stats) if stats == CaptureStats::default()));

        handle.shutdown();
        thread.join().unwrap();
        assert!(matches!(handle.drain().last(), Some(CaptureMessage::Shutdown)));
    }
}
