//! # Event Bridge Module
//!
//! Fans out bridge activity to any number of subscribers over four channels:
//!
//! | Channel | Event | Fired when |
//! |---------|-------|------------|
//! | `line` | [`LineEvent`] | every line read from the serial port |
//! | `payload` | [`PayloadEvent`] | a framed JSON value was extracted |
//! | `stopped` | [`StoppedEvent`] | a connection ended, requested or not |
//! | `error` | [`ErrorEvent`] | a recoverable fault occurred |
//!
//! Each channel is a `tokio::sync::broadcast` channel: FIFO per channel, no
//! replay for late subscribers, and publishing never blocks or fails when
//! nobody is listening.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{ErrorKind, TelemetryBridgeError};
use crate::framer::meta::format_timestamp;

pub use crate::framer::LineEvent;

/// Per-channel buffer; slower subscribers lose the oldest events
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A framed payload, shared read-only between subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadEvent {
    /// Port the payload arrived on
    pub address: String,
    pub payload: Arc<Value>,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// `disconnect()` was called
    Requested,
    /// The transport closed on its own (device removed, EOF, fatal read error)
    TransportClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEvent {
    pub address: String,
    pub reason: StopReason,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: String,
}

impl From<&TelemetryBridgeError> for ErrorEvent {
    fn from(err: &TelemetryBridgeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            timestamp: format_timestamp(chrono::Utc::now()),
        }
    }
}

/// Multi-subscriber publisher for bridge events.
///
/// Cloning is cheap; all clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBridge {
    line: broadcast::Sender<LineEvent>,
    payload: broadcast::Sender<PayloadEvent>,
    stopped: broadcast::Sender<StoppedEvent>,
    error: broadcast::Sender<ErrorEvent>,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        let (line, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (payload, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (stopped, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (error, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            line,
            payload,
            stopped,
            error,
        }
    }

    pub fn subscribe_lines(&self) -> broadcast::Receiver<LineEvent> {
        self.line.subscribe()
    }

    pub fn subscribe_payloads(&self) -> broadcast::Receiver<PayloadEvent> {
        self.payload.subscribe()
    }

    pub fn subscribe_stopped(&self) -> broadcast::Receiver<StoppedEvent> {
        self.stopped.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.error.subscribe()
    }

    // A send error only means nobody is subscribed right now.

    pub fn publish_line(&self, event: LineEvent) {
        let _ = self.line.send(event);
    }

    pub fn publish_payload(&self, event: PayloadEvent) {
        let delivered = self.payload.send(event).unwrap_or(0);
        trace!("Payload delivered to {} subscriber(s)", delivered);
    }

    pub fn publish_stopped(&self, event: StoppedEvent) {
        let _ = self.stopped.send(event);
    }

    pub fn publish_error(&self, event: ErrorEvent) {
        let _ = self.error.send(event);
    }

    /// Publish `err` on the `error` channel
    pub fn report(&self, err: &TelemetryBridgeError) {
        self.publish_error(ErrorEvent::from(err));
    }
}
