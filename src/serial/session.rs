//! Reader task for one open serial connection.
//!
//! Reads bytes, splits them into lines, runs each line through a
//! [`LineFramer`] and publishes the results. Lines are processed strictly in
//! arrival order by this single task; nothing else touches its framer.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::lines::LineBuffer;
use super::port_trait::PortStream;
use crate::error::TelemetryBridgeError;
use crate::events::{EventBridge, PayloadEvent, StopReason, StoppedEvent};
use crate::framer::meta::{format_timestamp, MonotonicClock};
use crate::framer::protocol::DEFAULT_TOPIC;
use crate::framer::{FramerAction, LineFramer};
use crate::telemetry::SinkHandle;

/// Bytes requested per read
const READ_CHUNK_SIZE: usize = 1024;

/// Consecutive failed reads that are treated as the device closing the port
///
/// Isolated read errors are reported and the session keeps reading. After
/// this many in a row with no successful read in between, the session ends
/// with [`StopReason::TransportClosed`] as if the transport had closed itself.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;

/// Pause after a failed read before trying again
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Everything a session publishes to.
#[derive(Debug, Clone)]
pub(crate) struct SessionContext {
    pub events: EventBridge,
    pub sink: SinkHandle,
    pub clock: Arc<MonotonicClock>,
}

/// Errors that mean the device is gone rather than a transient fault
fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
    )
}

/// Run until `shutdown` fires (or its sender is dropped) or the transport closes
///
/// Emits exactly one `stopped` event on the way out.
pub(crate) async fn run(
    address: String,
    mut stream: PortStream,
    mut shutdown: oneshot::Receiver<()>,
    ctx: SessionContext,
) {
    let mut framer = LineFramer::new();
    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut consecutive_errors = 0u32;

    let reason = loop {
        let read = tokio::select! {
            biased;
            _ = &mut shutdown => break StopReason::Requested,
            read = stream.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                if let Some(rest) = lines.finish() {
                    handle_line(&address, &mut framer, &rest, &ctx);
                }
                info!("Serial port {} closed", address);
                break StopReason::TransportClosed;
            }
            Ok(n) => {
                consecutive_errors = 0;
                lines.extend(&chunk[..n]);
                while let Some(line) = lines.next_line() {
                    handle_line(&address, &mut framer, &line, &ctx);
                }
            }
            Err(e) if is_disconnect(&e) => {
                warn!("Serial port {} disconnected: {}", address, e);
                break StopReason::TransportClosed;
            }
            Err(e) => {
                consecutive_errors += 1;
                let err = TelemetryBridgeError::Transport {
                    address: address.clone(),
                    message: e.to_string(),
                };
                warn!("{}", err);
                ctx.events.report(&err);

                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    warn!(
                        "Giving up on {} after {} consecutive read errors",
                        address, consecutive_errors
                    );
                    break StopReason::TransportClosed;
                }

                tokio::select! {
                    biased;
                    _ = &mut shutdown => break StopReason::Requested,
                    _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                }
            }
        }
    };

    drop(stream);
    debug!("Session on {} ended: {:?}", address, reason);

    ctx.events.publish_stopped(StoppedEvent {
        address,
        reason,
        timestamp: format_timestamp(ctx.clock.now()),
    });
}

fn handle_line(address: &str, framer: &mut LineFramer, raw: &str, ctx: &SessionContext) {
    let framed = framer.process_line(raw, ctx.clock.now());
    ctx.events.publish_line(framed.line);

    match framed.action {
        FramerAction::Payload(value) => {
            let payload = Arc::new(value);
            info!(
                "Payload received on {} (topic: {})",
                address,
                framer.current_topic().unwrap_or(DEFAULT_TOPIC)
            );
            ctx.sink.submit(payload.clone());
            ctx.events.publish_payload(PayloadEvent {
                address: address.to_string(),
                payload,
            });
        }
        FramerAction::Malformed { line, reason } => {
            warn!("Could not parse payload as JSON: {}\n{}", reason, line);
            ctx.events.report(&TelemetryBridgeError::MalformedPayload(reason));
        }
        _ => {}
    }
}
