//! # Serial Communication Module
//!
//! Manages the single serial connection to the LoRa receiver.
//!
//! This module handles:
//! - Listing ports and picking one automatically
//! - Opening the port at 115,200 baud (8N1) unless configured otherwise
//! - Streaming lines through the framer on a dedicated task
//! - Detecting device removal and surfacing it as a `stopped` event
//! - Enforcing at most one open connection (disconnect-then-connect)
//!
//! The manager never retries on its own; failed opens and enumeration errors
//! are returned to the caller.

pub mod lines;
pub mod port_trait;
mod session;

pub use session::MAX_CONSECUTIVE_READ_ERRORS;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryBridgeError};
use crate::events::EventBridge;
use crate::framer::meta::MonotonicClock;
use crate::ports::{self, PortLister, PortListing, SystemPortLister};
use crate::telemetry::SinkHandle;
use port_trait::{PortOpener, TokioSerialOpener};
use session::SessionContext;

/// Default baud rate of the receiver sketch
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// One open serial session.
#[derive(Debug)]
pub struct ConnectionHandle {
    address: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the session task is still reading
    pub fn is_open(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the session and wait until the port is closed
    async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // Already gone if the transport closed on its own
            let _ = shutdown.send(());
        }

        if let Err(e) = self.task.await {
            warn!("Session task for {} failed: {}", self.address, e);
        }
    }
}

/// Result of a successful [`ConnectionManager::auto_connect`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoConnectOutcome {
    /// Port that was opened
    pub address: String,
    /// Listing the port was chosen from
    pub listing: PortListing,
}

/// Owns the serial connection and the boundary operations exposed to a UI.
///
/// # Examples
///
/// ```no_run
/// use lora_telemetry_bridge::events::EventBridge;
/// use lora_telemetry_bridge::serial::{ConnectionManager, DEFAULT_BAUD_RATE};
/// use lora_telemetry_bridge::telemetry::{PayloadSink, SinkHandle};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let events = EventBridge::new();
///     let sink = SinkHandle::spawn(PayloadSink::new("snapshot.json", true), events.clone());
///     let manager = ConnectionManager::new(DEFAULT_BAUD_RATE, events.clone(), sink);
///
///     let mut payloads = events.subscribe_payloads();
///     let outcome = manager.auto_connect().await?;
///     println!("Listening on {}", outcome.address);
///
///     while let Ok(event) = payloads.recv().await {
///         println!("{}", event.payload);
///     }
///     Ok(())
/// }
/// ```
pub struct ConnectionManager {
    opener: Arc<dyn PortOpener>,
    lister: Arc<dyn PortLister>,
    baud_rate: u32,
    ctx: SessionContext,
    session: Mutex<Option<ConnectionHandle>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager using the real serial ports
    ///
    /// # Arguments
    ///
    /// * `baud_rate` - Line speed for every connection
    /// * `events` - Where line/payload/stopped/error events are published
    /// * `sink` - Where framed payloads are persisted
    pub fn new(baud_rate: u32, events: EventBridge, sink: SinkHandle) -> Self {
        Self::with_backends(
            Arc::new(TokioSerialOpener),
            Arc::new(SystemPortLister),
            baud_rate,
            events,
            sink,
        )
    }

    /// Create a manager with custom port backends (used by tests)
    pub fn with_backends(
        opener: Arc<dyn PortOpener>,
        lister: Arc<dyn PortLister>,
        baud_rate: u32,
        events: EventBridge,
        sink: SinkHandle,
    ) -> Self {
        Self {
            opener,
            lister,
            baud_rate,
            ctx: SessionContext {
                events,
                sink,
                clock: Arc::new(MonotonicClock::new()),
            },
            session: Mutex::new(None),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn events(&self) -> &EventBridge {
        &self.ctx.events
    }

    pub fn sink(&self) -> &SinkHandle {
        &self.ctx.sink
    }

    /// Enumerate and score the available ports
    ///
    /// # Errors
    ///
    /// Returns `Enumeration` if the OS listing fails
    pub fn list_ports(&self) -> Result<PortListing> {
        ports::enumerate(self.lister.as_ref())
    }

    /// Open `address`, replacing any current connection
    ///
    /// Concurrent calls are serialized: each one fully disconnects the
    /// previous session before opening its own.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` if `address` is blank (no I/O is attempted)
    /// - `Open` if the port cannot be opened; the manager is left disconnected
    pub async fn connect(&self, address: &str) -> Result<()> {
        let address = address.trim();
        if address.is_empty() {
            return Err(TelemetryBridgeError::InvalidAddress(address.to_string()));
        }

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            debug!("Closing {} before connecting to {}", previous.address(), address);
            previous.close().await;
        }

        debug!("Opening serial port {} at {} baud", address, self.baud_rate);
        let stream = self
            .opener
            .open(address, self.baud_rate)
            .map_err(|source| TelemetryBridgeError::Open {
                address: address.to_string(),
                source,
            })?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(session::run(
            address.to_string(),
            stream,
            shutdown_rx,
            self.ctx.clone(),
        ));

        info!("Connected to {} at {} baud", address, self.baud_rate);
        *session = Some(ConnectionHandle {
            address: address.to_string(),
            shutdown: Some(shutdown),
            task,
        });

        Ok(())
    }

    /// Pick a port heuristically and connect to it
    ///
    /// # Errors
    ///
    /// - `Enumeration` if the ports cannot be listed
    /// - `NoCompatiblePort` if there is no port at all
    /// - `Open` if the chosen port cannot be opened
    pub async fn auto_connect(&self) -> Result<AutoConnectOutcome> {
        let listing = self.list_ports()?;
        let address = listing
            .auto_selected
            .clone()
            .ok_or(TelemetryBridgeError::NoCompatiblePort)?;

        info!("Auto-selected serial port {}", address);
        self.connect(&address).await?;

        Ok(AutoConnectOutcome { address, listing })
    }

    /// Close the current connection, if any
    ///
    /// Resolves once the port is closed; no `line` or `payload` event is
    /// published for this connection afterwards.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(handle) = session.take() {
            info!("Disconnecting from {}", handle.address());
            handle.close().await;
        }
    }

    /// Whether a connection is currently open
    ///
    /// Becomes `false` on its own when the device goes away.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(ConnectionHandle::is_open)
    }

    /// Address of the open connection
    pub async fn current_address(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|handle| handle.is_open())
            .map(|handle| handle.address().to_string())
    }
}
