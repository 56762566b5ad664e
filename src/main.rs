//! StimCap - Main Entry Point
//!
//! Records stimulus-tagged motion-capture sessions and inspects recordings
//! from the command line.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use stimcap_rs::{
    capture::{CaptureHandle, CaptureMessage, MotionDevice, SampleNotifier},
    config::{AppConfig, LoggingConfig},
    session::{reader, RecordFormat, RecordingSummary, WriterOptions},
    stimulus::StimulusState,
    types::Record,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often pending worker messages are reported while recording
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "stimcap", version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a session until the duration elapses or stdin reaches EOF
    Record {
        /// Recording file; defaults to a timestamped name in the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Do not open the stimulus channel
        #[arg(long)]
        no_channel: bool,
    },
    /// Print the contents of a recording
    Inspect {
        /// Recording file
        path: PathBuf,

        /// Record layout when the file has no header
        #[arg(short, long)]
        format: Option<RecordFormat>,

        /// Report records before a damaged tail instead of failing
        #[arg(long)]
        lenient: bool,

        /// Print one JSON object per record followed by a summary
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        /// Save the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => AppConfig::load_or_default(),
    };

    let _guard = init_logging(&config.logging);

    match cli.command {
        Commands::Record {
            output,
            duration,
            no_channel,
        } => record(&config, output, duration.map(Duration::from_secs), !no_channel),
        Commands::Inspect {
            path,
            format,
            lenient,
            json,
        } => inspect(&path, format.unwrap_or(config.recording.format), lenient, json),
        Commands::Config { write } => {
            print!("{}", config.to_toml()?);
            if write {
                let path = match cli.config {
                    Some(path) => path,
                    None => AppConfig::default_path().context("No config directory on this platform")?,
                };
                config.save(&path)?;
                eprintln!("Saved config to {}", path.display());
            }
            Ok(())
        }
    }
}

/// Initialize logging; the returned guard must live until exit
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "stimcap.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn record(config: &AppConfig, output: Option<PathBuf>, duration: Option<Duration>, use_channel: bool) -> Result<()> {
    let path = match output {
        Some(path) => path,
        None => {
            config.ensure_output_dir()?;
            config.recording_path(chrono::Local::now())
        }
    };

    let stimulus = Arc::new(StimulusState::new());

    #[cfg(unix)]
    let channel = if use_channel && config.channel.enabled {
        open_channel(config, stimulus.clone())
    } else {
        None
    };
    #[cfg(not(unix))]
    if use_channel && config.channel.enabled {
        tracing::warn!("Stimulus channel is not supported on this platform");
    }

    #[cfg(unix)]
    let notifier = channel
        .clone()
        .map(|c| c as Arc<dyn SampleNotifier>);
    #[cfg(not(unix))]
    let notifier: Option<Arc<dyn SampleNotifier>> = None;

    let (capture, worker) = CaptureHandle::spawn(
        open_device(config)?,
        stimulus,
        WriterOptions::from(&config.recording),
        notifier,
    )?;

    capture.start_recording(path.clone());
    match duration {
        Some(d) => tracing::info!("Recording to {} for {:?}", path.display(), d),
        None => tracing::info!("Recording to {}; close stdin (Ctrl-D) to stop", path.display()),
    }

    // Without a duration, stop when stdin is closed
    let stop_rx = match duration {
        Some(_) => crossbeam_channel::never::<()>(),
        None => {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            std::thread::Builder::new()
                .name("stdin-watch".to_string())
                .spawn(move || {
                    for _ in std::io::stdin().lock().lines() {}
                    let _ = stop_tx.send(());
                })?;
            stop_rx
        }
    };

    let deadline = duration.map(|d| Instant::now() + d);
    let mut aborted = false;
    loop {
        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                REPORT_INTERVAL.min(deadline - now)
            }
            None => REPORT_INTERVAL,
        };
        match stop_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        #[cfg(unix)]
        if let Some(channel) = &channel {
            for event in channel.drain_events() {
                report_channel_event(event);
            }
        }
        for msg in capture.drain() {
            aborted |= report(msg);
        }
        if aborted {
            break;
        }
    }

    capture.stop_recording();
    capture.request_stats();
    capture.shutdown();
    if worker.join().is_err() {
        bail!("Capture worker panicked");
    }
    for msg in capture.drain() {
        aborted |= report(msg);
    }

    #[cfg(unix)]
    if let Some(channel) = channel {
        channel.shutdown();
    }

    if aborted {
        bail!("Recording {} aborted", path.display());
    }
    Ok(())
}

#[cfg(unix)]
fn open_channel(config: &AppConfig, stimulus: Arc<StimulusState>) -> Option<Arc<stimcap_rs::stimulus::StimulusChannel>> {
    use stimcap_rs::config::ChannelRole;
    use stimcap_rs::stimulus::StimulusChannel;

    let result = match config.channel.role {
        ChannelRole::Connect => StimulusChannel::connect(&config.channel, stimulus),
        ChannelRole::Listen => StimulusChannel::listen(&config.channel, stimulus),
    };
    match result {
        Ok(channel) => Some(Arc::new(channel)),
        Err(e) => {
            tracing::warn!("Recording without stimulus channel: {}", e);
            None
        }
    }
}

#[cfg(unix)]
fn report_channel_event(event: stimcap_rs::stimulus::ChannelEvent) {
    use stimcap_rs::stimulus::ChannelEvent;

    match event {
        ChannelEvent::Stimulus(code) => tracing::info!("Stimulus {} pending", code),
        ChannelEvent::Ignored(text) => tracing::debug!("Peer says: {}", text),
        ChannelEvent::Rejected(reason) => tracing::warn!("Rejected stimulus: {}", reason),
        ChannelEvent::Disconnected => tracing::warn!("Stimulus peer disconnected"),
        ChannelEvent::Failed(reason) => tracing::error!("Stimulus channel failed: {}", reason),
    }
}

#[cfg(feature = "mock-device")]
fn open_device(config: &AppConfig) -> Result<Box<dyn MotionDevice>> {
    Ok(Box::new(stimcap_rs::capture::MockDevice::from_config(&config.device)))
}

#[cfg(not(feature = "mock-device"))]
fn open_device(_config: &AppConfig) -> Result<Box<dyn MotionDevice>> {
    bail!("No motion device available; build with the `mock-device` feature")
}

/// Log a worker message; returns `true` if the recording was aborted
fn report(msg: CaptureMessage) -> bool {
    match msg {
        CaptureMessage::RecordingAborted(reason) => {
            tracing::error!("Recording aborted: {}", reason);
            return true;
        }
        CaptureMessage::Error(e) => tracing::warn!("{}", e),
        CaptureMessage::StimulusRecorded { code, sample_id } => {
            tracing::info!("Stimulus {} recorded with sample {}", code, sample_id)
        }
        CaptureMessage::RecordingStopped { path, stats } => {
            let path = path.map(|p| p.display().to_string()).unwrap_or_default();
            println!(
                "{}: {} records, {} tagged, {} bytes",
                path, stats.records_written, stats.tagged_records, stats.bytes_written
            );
        }
        CaptureMessage::Stats(stats) => {
            tracing::info!(
                "{} samples seen, {} records written, {} write failures",
                stats.samples_seen,
                stats.records_written,
                stats.write_failures
            )
        }
        other => tracing::debug!("{:?}", other),
    }
    false
}

#[derive(Serialize)]
struct RecordLine {
    index: usize,
    timestamp: i64,
    time: Option<String>,
    stimulus_code: i32,
    payload_len: usize,
}

impl RecordLine {
    fn new(index: usize, record: &Record) -> Self {
        Self {
            index,
            timestamp: record.captured_at.raw(),
            time: record.captured_at.to_datetime().map(|t| t.to_rfc3339()),
            stimulus_code: record.stimulus_code,
            payload_len: record.payload_len(),
        }
    }
}

fn inspect(path: &Path, format: RecordFormat, lenient: bool, json: bool) -> Result<()> {
    let outcome = reader::read_lenient(path, format)?;
    if let Some(e) = &outcome.error {
        if !lenient {
            bail!("{} is damaged after {} records: {}", path.display(), outcome.records.len(), e);
        }
        tracing::warn!("Stopped after {} records: {}", outcome.records.len(), e);
    }

    let summary = RecordingSummary::from_records(&outcome.records);
    if json {
        for (index, record) in outcome.records.iter().enumerate() {
            println!("{}", serde_json::to_string(&RecordLine::new(index, record))?);
        }
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    for (index, record) in outcome.records.iter().enumerate() {
        if record.is_tagged() {
            println!("#{:<8} {}  stimulus {}", index, record.captured_at, record.stimulus_code);
        }
    }
    println!("records:  {}", summary.record_count);
    println!("tagged:   {}", summary.tagged_count);
    println!("payload:  {} bytes", summary.payload_bytes);
    if let Some(duration) = summary.duration() {
        println!("duration: {:.3} s", duration.num_milliseconds() as f64 / 1000.0);
    }
    if !outcome.is_complete() {
        println!("(truncated)");
    }
    Ok(())
}
