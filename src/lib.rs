//! # LoRa Telemetry Bridge Library
//!
//! Read sensor telemetry from a LoRa receiver attached over USB serial.
//!
//! The receiver prints human-readable diagnostics interleaved with framed JSON
//! payloads. This library finds and opens the serial port, extracts the
//! payloads from the text stream, stamps them with topic and reception time,
//! persists the latest one to disk and publishes everything as events.
//!
//! ## Architecture
//!
//! ```text
//! serial port -> serial::session -> framer::LineFramer -> events::EventBridge
//!                                                      \-> telemetry::SinkHandle -> JSON file
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod framer;
pub mod ports;
pub mod serial;
pub mod telemetry;
