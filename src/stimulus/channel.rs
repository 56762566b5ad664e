//! Stimulus channel transport
//!
//! A bidirectional line-oriented connection to one external process over a
//! Unix domain socket named by convention (`<socket_dir>/<name>.sock`).
//!
//! Inbound lines are handled on a dedicated `stimulus-rx` thread, separate
//! from the capture loop, and published into the shared [`StimulusState`].
//! Observers can follow what happened through [`ChannelEvent`]s.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stimcap_rs::config::ChannelConfig;
//! use stimcap_rs::stimulus::{StimulusChannel, StimulusState};
//!
//! let state = Arc::new(StimulusState::new());
//! let channel = StimulusChannel::connect(&ChannelConfig::default(), state.clone())?;
//!
//! // Later, on the first device sample
//! channel.notify_sample()?;
//! ```

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::config::ChannelConfig;
use crate::error::{Result, StimCapError};
use crate::types::ConnectionStatus;

use super::message::{apply_inbound, encode_line, InboundMessage};
use super::state::StimulusState;

/// Capacity of the observer event queue
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Longest inbound line that is parsed; longer lines are skipped
const MAX_LINE_LEN: usize = 4096;

/// Notification about channel activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A stimulus code was published for the next record
    Stimulus(i32),
    /// A non-numeric line was received and ignored
    Ignored(String),
    /// A numeric line was rejected (negative or out of range)
    Rejected(String),
    /// The peer closed the connection
    Disconnected,
    /// The transport failed while receiving
    Failed(String),
}

/// Connection to the stimulus peer
pub struct StimulusChannel {
    /// Write half, shared by all senders
    writer: Mutex<UnixStream>,
    /// Shared tag state the receive thread publishes into
    state: Arc<StimulusState>,
    /// Text sent on the first sample of the session
    ready_sentinel: String,
    /// Whether the ready sentinel went out this session
    ready_sent: AtomicBool,
    /// Cleared by the receive thread when the connection ends
    connected: Arc<AtomicBool>,
    /// Set once a receive failure has been observed
    failed: Arc<AtomicBool>,
    /// Observer events
    events_rx: Receiver<ChannelEvent>,
    /// Receive thread
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    /// Socket file to remove on shutdown (listening side only)
    owned_socket: Option<PathBuf>,
}

impl StimulusChannel {
    /// Dial the peer's socket
    pub fn connect(config: &ChannelConfig, state: Arc<StimulusState>) -> Result<Self> {
        let path = config.socket_path();
        let stream = UnixStream::connect(&path).map_err(|e| {
            StimCapError::Channel(format!("Failed to connect to {}: {}", path.display(), e))
        })?;
        tracing::info!("Connected to stimulus channel at {}", path.display());
        Self::from_stream(stream, config, state)
    }

    /// Bind the socket and wait for one peer to connect
    pub fn listen(config: &ChannelConfig, state: Arc<StimulusState>) -> Result<Self> {
        let path = config.socket_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path).map_err(|e| {
            StimCapError::Channel(format!("Failed to bind {}: {}", path.display(), e))
        })?;

        tracing::info!("Waiting for stimulus peer on {}", path.display());
        let (stream, _) = listener
            .accept()
            .map_err(|e| StimCapError::Channel(format!("Failed to accept peer: {}", e)))?;
        tracing::info!("Stimulus peer connected");

        let mut channel = Self::from_stream(stream, config, state)?;
        channel.owned_socket = Some(path);
        Ok(channel)
    }

    /// Run the channel over an already-connected stream
    ///
    /// Spawns the receive thread and sends the greeting.
    pub fn from_stream(stream: UnixStream, config: &ChannelConfig, state: Arc<StimulusState>) -> Result<Self> {
        let reader = stream
            .try_clone()
            .map_err(|e| StimCapError::Channel(format!("Failed to clone stream: {}", e)))?;

        let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));

        let rx_thread = {
            let state = state.clone();
            let connected = connected.clone();
            let failed = failed.clone();
            std::thread::Builder::new()
                .name("stimulus-rx".to_string())
                .spawn(move || receive_loop(reader, state, events_tx, connected, failed))?
        };

        let channel = Self {
            writer: Mutex::new(stream),
            state,
            ready_sentinel: config.ready_sentinel.clone(),
            ready_sent: AtomicBool::new(false),
            connected,
            failed,
            events_rx,
            rx_thread: Mutex::new(Some(rx_thread)),
            owned_socket: None,
        };

        channel.send(&config.greeting)?;
        Ok(channel)
    }

    /// Send one line to the peer; failures are reported, not retried
    pub fn send(&self, text: &str) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StimCapError::Channel("Writer lock poisoned".to_string()))?;
        writer
            .write_all(encode_line(text).as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| StimCapError::Channel(format!("Failed to send '{}': {}", text, e)))?;
        tracing::trace!("Sent '{}' on stimulus channel", text);
        Ok(())
    }

    /// Send the ready sentinel if this is the session's first sample
    ///
    /// Returns `true` if the sentinel was sent by this call.
    pub fn notify_sample(&self) -> Result<bool> {
        if self.ready_sent.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.send(&self.ready_sentinel)?;
        tracing::info!("Sent ready sentinel '{}'", self.ready_sentinel);
        Ok(true)
    }

    /// Check if the ready sentinel has gone out this session
    pub fn session_ready(&self) -> bool {
        self.ready_sent.load(Ordering::Acquire)
    }

    /// Shared tag state this channel publishes into
    pub fn state(&self) -> &Arc<StimulusState> {
        &self.state
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        if self.failed.load(Ordering::Acquire) {
            ConnectionStatus::Error
        } else if self.connected.load(Ordering::Acquire) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Observer event queue
    pub fn events(&self) -> &Receiver<ChannelEvent> {
        &self.events_rx
    }

    /// Receive all pending events
    pub fn drain_events(&self) -> Vec<ChannelEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Close the connection and join the receive thread
    pub fn shutdown(&self) {
        if let Ok(writer) = self.writer.lock() {
            if let Err(e) = writer.shutdown(Shutdown::Both) {
                if e.kind() != std::io::ErrorKind::NotConnected {
                    tracing::debug!("Stimulus channel shutdown: {}", e);
                }
            }
        }

        let handle = self.rx_thread.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Stimulus receive thread panicked");
            }
        }

        if let Some(path) = &self.owned_socket {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for StimulusChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StimulusChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StimulusChannel")
            .field("status", &self.status())
            .field("ready_sent", &self.session_ready())
            .field("pending", &self.state.peek())
            .finish()
    }
}

/// Receive thread body: one line at a time until EOF or error
fn receive_loop(
    stream: UnixStream,
    state: Arc<StimulusState>,
    events_tx: Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) {
    tracing::debug!("Stimulus receive thread started");

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(128);
    loop {
        match read_bounded_line(&mut reader, &mut buf) {
            Ok(InboundLine::Eof) => break,
            Ok(InboundLine::Line) => {
                // Invalid UTF-8 is free-form text like any other
                let line = String::from_utf8_lossy(&buf);
                handle_line(&state, &events_tx, &line);
            }
            Ok(InboundLine::Overlong(len)) => {
                tracing::warn!("Skipped inbound line of {} bytes", len);
                publish(&events_tx, ChannelEvent::Ignored(format!("<{} bytes>", len)));
            }
            Err(e) => {
                tracing::warn!("Stimulus channel receive failed: {}", e);
                failed.store(true, Ordering::Release);
                publish(&events_tx, ChannelEvent::Failed(e.to_string()));
                break;
            }
        }
    }

    connected.store(false, Ordering::Release);
    publish(&events_tx, ChannelEvent::Disconnected);
    tracing::debug!("Stimulus receive thread stopped");
}

/// Result of reading one inbound line
#[derive(Debug, PartialEq, Eq)]
enum InboundLine {
    /// A line of at most [`MAX_LINE_LEN`] bytes is in the buffer
    Line,
    /// A longer line was consumed and dropped
    Overlong(usize),
    /// The peer closed the stream
    Eof,
}

/// Read up to and including the next newline without buffering more than
/// [`MAX_LINE_LEN`] bytes of it
fn read_bounded_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<InboundLine> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(InboundLine::Eof);
    }
    if buf.len() <= MAX_LINE_LEN || buf.last() == Some(&b'\n') {
        return Ok(InboundLine::Line);
    }

    let mut skipped = buf.len();
    buf.clear();
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            break;
        }
        let (consumed, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        reader.consume(consumed);
        skipped += consumed;
        if done {
            break;
        }
    }
    Ok(InboundLine::Overlong(skipped))
}

fn handle_line(state: &StimulusState, events_tx: &Sender<ChannelEvent>, line: &str) {
    match apply_inbound(state, line) {
        Ok(InboundMessage::Stimulus(code)) => {
            tracing::debug!("Stimulus {} pending for next record", code);
            publish(events_tx, ChannelEvent::Stimulus(code));
        }
        Ok(InboundMessage::Text(text)) => {
            tracing::debug!("Ignoring non-numeric message '{}'", text);
            publish(events_tx, ChannelEvent::Ignored(text));
        }
        Err(e) => {
            tracing::warn!("Rejected inbound message '{}': {}", line.trim(), e);
            publish(events_tx, ChannelEvent::Rejected(e.to_string()));
        }
    }
}

/// Queue an event without ever blocking the receive path
fn publish(events_tx: &Sender<ChannelEvent>, event: ChannelEvent) {
    match events_tx.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(event)) => {
            tracing::trace!("Event queue full, dropping {:?}", event);
        }
    }
}
