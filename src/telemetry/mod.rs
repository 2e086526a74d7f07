//! # Telemetry Module
//!
//! Handles the latest telemetry payload once the framer has extracted it.
//!
//! This module handles:
//! - Persisting the most recent payload as a pretty JSON snapshot file
//! - Keeping the in-memory "current telemetry" copy for live consumers
//! - A typed, optional view of the sensor payload schema

pub mod sink;
pub mod snapshot;

pub use sink::{PayloadSink, SinkHandle};
pub use snapshot::TelemetrySnapshot;
