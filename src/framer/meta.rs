//! # Payload Metadata
//!
//! Capture timestamps and the `meta` object injected into object payloads.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Mutex;

use super::protocol::{DEFAULT_TOPIC, META_KEY, META_RECEIVED_AT_KEY, META_TOPIC_KEY};

/// Format a timestamp as ISO-8601 UTC with microsecond precision
/// (e.g. `2024-05-01T12:30:00.123456Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Wall clock that never goes backwards.
///
/// Shared by every connection of a manager so `meta.receivedAt` stays
/// non-decreasing across reconnects even if the system clock is stepped back.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, clamped to be no earlier than the previous reading
    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    /// Clamp `candidate` against the last reading and record it
    pub fn observe(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stamped = match *last {
            Some(previous) if previous > candidate => previous,
            _ => candidate,
        };
        *last = Some(stamped);
        stamped
    }
}

/// Inject `meta.topic` and `meta.receivedAt` into an object payload
///
/// Topic fallback order: the frame's topic, an existing non-empty string
/// `meta.topic`, then [`DEFAULT_TOPIC`]. Other keys of an existing `meta`
/// object are kept; a non-object `meta` is replaced. Non-object payloads are
/// left untouched.
///
/// # Returns
///
/// * `bool` - Whether metadata was injected
pub fn inject_meta(payload: &mut Value, topic: Option<&str>, received_at: DateTime<Utc>) -> bool {
    let Some(object) = payload.as_object_mut() else {
        return false;
    };

    let meta = object
        .entry(META_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }

    if let Some(meta) = meta.as_object_mut() {
        let existing = meta
            .get(META_TOPIC_KEY)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let resolved = topic
            .map(str::to_string)
            .or(existing)
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        meta.insert(META_TOPIC_KEY.to_string(), Value::String(resolved));
        meta.insert(
            META_RECEIVED_AT_KEY.to_string(),
            Value::String(format_timestamp(received_at)),
        );
    }

    true
}
