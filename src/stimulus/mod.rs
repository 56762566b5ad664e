//! Stimulus tagging
//!
//! An external presentation program announces stimulus events over a named
//! local channel. The most recent code is held in [`StimulusState`] until the
//! recording writer consumes it with the next record.

#[cfg(unix)]
pub mod channel;
pub mod message;
pub mod state;

#[cfg(unix)]
pub use channel::{ChannelEvent, StimulusChannel};
pub use message::InboundMessage;
pub use state::StimulusState;
