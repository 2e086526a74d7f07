//! # Line Framer Module
//!
//! Extracts framed JSON payloads from the receiver's line-oriented serial log.
//!
//! The receiver firmware interleaves free-form diagnostics with payload blocks
//! bracketed by [`protocol::START_MARKER`] and [`protocol::END_MARKER`]. The
//! framer is a two-state machine (`Idle`, `Capturing`) fed one line at a time:
//!
//! 1. every line produces a [`LineEvent`] for diagnostics
//! 2. a start marker enters `Capturing` and clears the topic
//! 3. in `Idle`, anything else is ignored
//! 4. `Topic:` lines set the frame topic
//! 5. lines starting with `{` or `[` are parsed as one JSON value each
//! 6. an end marker returns to `Idle`
//!
//! A malformed JSON line is reported but never changes state, so one corrupted
//! reading cannot desynchronize the stream.
//!
//! ## Usage
//!
//! ```
//! use chrono::Utc;
//! use lora_telemetry_bridge::framer::{FramerAction, LineFramer};
//!
//! let mut framer = LineFramer::new();
//! framer.process_line("===== Payload recibido =====", Utc::now());
//! framer.process_line("Topic: gps", Utc::now());
//! let framed = framer.process_line(r#"{"lat": 40.4}"#, Utc::now());
//!
//! match framed.action {
//!     FramerAction::Payload(value) => assert_eq!(value["meta"]["topic"], "gps"),
//!     other => panic!("unexpected action: {:?}", other),
//! }
//! ```

pub mod meta;
pub mod protocol;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use meta::{format_timestamp, inject_meta};
use protocol::{looks_like_json, parse_topic, END_MARKER, START_MARKER, TOPIC_PREFIX};

/// Framer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Outside a payload block
    #[default]
    Idle,
    /// Between a start marker and an end marker
    Capturing,
}

/// One observed serial line, emitted regardless of framing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    /// Line exactly as received (delimiter removed)
    pub raw: String,
    /// Line with trailing CR/LF removed
    pub text: String,
    /// Line with surrounding whitespace removed
    pub trimmed: String,
    /// Capture time, ISO-8601 UTC
    pub timestamp: String,
}

/// What the framer did with a line.
#[derive(Debug, Clone, PartialEq)]
pub enum FramerAction {
    /// Noise, blank line, or unrecognized text
    Ignored,
    /// Start marker seen
    FrameStarted,
    /// `Topic:` line consumed
    TopicSet(Option<String>),
    /// JSON value extracted (meta already injected for objects)
    Payload(Value),
    /// Line looked like JSON but failed to parse
    Malformed { line: String, reason: String },
    /// End marker seen
    FrameEnded,
}

/// A line together with its framing outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedLine {
    pub line: LineEvent,
    pub action: FramerAction,
}

/// Payload-block state machine for one connection.
#[derive(Debug, Default)]
pub struct LineFramer {
    state: CaptureState,
    current_topic: Option<String>,
}

impl LineFramer {
    /// Create a framer in the `Idle` state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn current_topic(&self) -> Option<&str> {
        self.current_topic.as_deref()
    }

    /// Return to `Idle` and forget the topic
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.current_topic = None;
    }

    /// Feed one line through the state machine
    ///
    /// # Arguments
    ///
    /// * `raw` - Line as delivered by the transport, without the `\n` delimiter
    /// * `now` - Capture time used for the line event and `meta.receivedAt`
    ///
    /// # Returns
    ///
    /// * `FramedLine` - The diagnostic line event and the framing action taken
    pub fn process_line(&mut self, raw: &str, now: DateTime<Utc>) -> FramedLine {
        let text = raw.trim_end_matches(['\r', '\n']);
        let trimmed = text.trim();

        let line = LineEvent {
            raw: raw.to_string(),
            text: text.to_string(),
            trimmed: trimmed.to_string(),
            timestamp: format_timestamp(now),
        };

        let action = self.transition(trimmed, now);
        FramedLine { line, action }
    }

    fn transition(&mut self, trimmed: &str, now: DateTime<Utc>) -> FramerAction {
        if trimmed.is_empty() {
            return FramerAction::Ignored;
        }

        if trimmed.starts_with(START_MARKER) {
            debug!("Payload block started");
            self.state = CaptureState::Capturing;
            self.current_topic = None;
            return FramerAction::FrameStarted;
        }

        if self.state == CaptureState::Idle {
            return FramerAction::Ignored;
        }

        if trimmed.starts_with(TOPIC_PREFIX) {
            self.current_topic = parse_topic(trimmed);
            debug!("Topic set to {:?}", self.current_topic);
            return FramerAction::TopicSet(self.current_topic.clone());
        }

        if looks_like_json(trimmed) {
            return match serde_json::from_str::<Value>(trimmed) {
                Ok(mut payload) => {
                    inject_meta(&mut payload, self.current_topic.as_deref(), now);
                    FramerAction::Payload(payload)
                }
                Err(e) => FramerAction::Malformed {
                    line: trimmed.to_string(),
                    reason: e.to_string(),
                },
            };
        }

        if trimmed.starts_with(END_MARKER) {
            debug!("Payload block ended");
            self.reset();
            return FramerAction::FrameEnded;
        }

        FramerAction::Ignored
    }
}
