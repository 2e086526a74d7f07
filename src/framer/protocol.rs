//! # Framing Protocol Constants
//!
//! Literals printed by the receiver firmware around each reconstructed LoRa payload:
//!
//! ```text
//! ===== Payload recibido =====
//! Topic: <topic-name>
//! {"sensors": {...}}
//! ============================
//! ```

/// Banner printed before a payload block
pub const START_MARKER: &str = "===== Payload recibido =====";

/// Rule printed after a payload block
pub const END_MARKER: &str = "============================";

/// Prefix of the optional topic line inside a block
pub const TOPIC_PREFIX: &str = "Topic:";

/// Topic used when the block did not declare one
pub const DEFAULT_TOPIC: &str = "sensors";

/// Key of the metadata object injected into object payloads
pub const META_KEY: &str = "meta";

/// Metadata field holding the topic
pub const META_TOPIC_KEY: &str = "topic";

/// Metadata field holding the capture timestamp
pub const META_RECEIVED_AT_KEY: &str = "receivedAt";

/// Whether a trimmed line opens a JSON value
pub fn looks_like_json(trimmed: &str) -> bool {
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Extract the topic from a `Topic:` line
///
/// Everything after the first colon, trimmed; `None` if that is empty.
pub fn parse_topic(trimmed: &str) -> Option<String> {
    let (_, rest) = trimmed.split_once(':')?;
    let topic = rest.trim();
    if topic.is_empty() {
        None
    } else {
        Some(topic.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_distinct() {
        assert!(!START_MARKER.starts_with(END_MARKER));
        assert!(!END_MARKER.starts_with(START_MARKER));
        assert_eq!(END_MARKER.len(), 28);
    }

    #[test]
    fn test_parse_topic() {
        assert_eq!(parse_topic("Topic: gps").as_deref(), Some("gps"));
        assert_eq!(parse_topic("Topic:imu/raw").as_deref(), Some("imu/raw"));
        assert_eq!(parse_topic("Topic: a:b").as_deref(), Some("a:b"));
        assert_eq!(parse_topic("Topic:   "), None);
        assert_eq!(parse_topic("Topic:"), None);
    }

    #[test]
    fn test_looks_like_json() {
        assert!(looks_like_json("{\"a\":1}"));
        assert!(looks_like_json("[1,2]"));
        assert!(!looks_like_json("RSSI: -42"));
        assert!(!looks_like_json(""));
    }
}
