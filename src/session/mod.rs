//! Recording sessions
//!
//! A recording is a flat file of framed motion-capture records, each carrying
//! the capture timestamp and the stimulus code that was pending when it was
//! written.
//!
//! # Features
//!
//! - Encode and decode records in the tagged or legacy layout
//! - Append records while consuming the shared stimulus tag exactly once
//! - Replay files strictly, or leniently up to a damaged tail
//! - Summarize a recording for inspection

pub mod codec;
pub mod reader;
pub mod types;
pub mod writer;

pub use codec::FrameCodec;
pub use reader::{read_all, read_lenient, RecordingReader};
pub use types::{ReadOutcome, RecordFormat, RecordingSummary, SessionState, TagResetPolicy, WriterStats};
pub use writer::{RecordingWriter, WriterOptions};
