//! Stimulus channel message protocol
//!
//! Messages are single lines of UTF-8 text. Inbound lines that parse as a
//! non-negative 32-bit integer are stimulus codes; anything non-numeric is
//! free-form text and is ignored.

use crate::error::{Result, StimCapError};

use super::state::StimulusState;

/// Identification sent once when the channel connects
pub const DEFAULT_GREETING: &str = "MotionCapture";

/// Sent once per session when the first device sample arrives
pub const DEFAULT_READY_SENTINEL: &str = "5443";

/// Classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// A stimulus code for the next record
    Stimulus(i32),
    /// Free-form text with no effect on recording
    Text(String),
}

impl InboundMessage {
    /// Classify one inbound line
    ///
    /// Negative or out-of-range numbers fail with
    /// [`StimCapError::InvalidStimulusCode`].
    pub fn parse(line: &str) -> Result<Self> {
        let text = line.trim();
        let digits = text.strip_prefix(&['-', '+'][..]).unwrap_or(text);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(InboundMessage::Text(text.to_string()));
        }

        let value = match text.parse::<i64>() {
            Ok(v) => v,
            Err(_) if text.starts_with('-') => return Err(StimCapError::InvalidStimulusCode(i64::MIN)),
            Err(_) => return Err(StimCapError::InvalidStimulusCode(i64::MAX)),
        };
        if value < 0 {
            return Err(StimCapError::InvalidStimulusCode(value));
        }
        i32::try_from(value)
            .map(InboundMessage::Stimulus)
            .map_err(|_| StimCapError::InvalidStimulusCode(value))
    }
}

/// Parse a line and publish any stimulus code into `state`
///
/// On error the state is left untouched.
pub fn apply_inbound(state: &StimulusState, line: &str) -> Result<InboundMessage> {
    let message = InboundMessage::parse(line)?;
    if let InboundMessage::Stimulus(code) = message {
        state.set(code);
    }
    Ok(message)
}

/// Frame outbound text as exactly one line
pub fn encode_line(text: &str) -> String {
    let mut line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    line.push('\n');
    line
}
