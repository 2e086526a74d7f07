//! # Error Types
//!
//! Custom error types for the telemetry bridge using `thiserror`.

use serde::Serialize;
use thiserror::Error;

/// Main error type for the telemetry bridge
#[derive(Debug, Error)]
pub enum TelemetryBridgeError {
    /// The OS serial device listing failed
    #[error("Failed to enumerate serial ports: {0}")]
    Enumeration(String),

    /// Empty or missing port address
    #[error("Invalid serial port address: {0:?}")]
    InvalidAddress(String),

    /// The transport could not be opened
    #[error("Failed to open {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A captured line looked like JSON but did not parse
    #[error("Payload was not valid JSON: {0}")]
    MalformedPayload(String),

    /// The snapshot could not be written to disk
    #[error("Failed to persist payload to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Runtime fault on an open connection
    #[error("Serial transport error on {address}: {message}")]
    Transport { address: String, message: String },

    /// Auto-connect found nothing to connect to
    #[error("No compatible serial port found")]
    NoCompatiblePort,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of [`TelemetryBridgeError`], carried on the `error` event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Enumeration,
    InvalidAddress,
    Open,
    MalformedPayload,
    Persist,
    Transport,
    NoCompatiblePort,
    Config,
    Io,
    Json,
}

impl TelemetryBridgeError {
    /// Classify this error for subscribers of the `error` channel.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Enumeration(_) => ErrorKind::Enumeration,
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::Open { .. } => ErrorKind::Open,
            Self::MalformedPayload(_) => ErrorKind::MalformedPayload,
            Self::Persist { .. } => ErrorKind::Persist,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::NoCompatiblePort => ErrorKind::NoCompatiblePort,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
        }
    }
}

/// Result type alias for the telemetry bridge
pub type Result<T> = std::result::Result<T, TelemetryBridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            TelemetryBridgeError::InvalidAddress(String::new()).kind(),
            ErrorKind::InvalidAddress
        );
        assert_eq!(TelemetryBridgeError::NoCompatiblePort.kind(), ErrorKind::NoCompatiblePort);

        let err = TelemetryBridgeError::Open {
            address: "/dev/ttyUSB0".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
        };
        assert_eq!(err.kind(), ErrorKind::Open);
        assert!(err.to_string().contains("/dev/ttyUSB0"));
    }

    #[test]
    fn test_error_kind_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorKind::MalformedPayload).unwrap();
        assert_eq!(json, "\"malformedPayload\"");
    }
}
