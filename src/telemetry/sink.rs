//! # Payload Sink
//!
//! Persists the most recent payload as a JSON snapshot file and keeps the
//! in-memory "current telemetry" copy.
//!
//! [`PayloadSink`] does the file I/O: atomic replace via a temporary file in
//! the same directory. [`SinkHandle`] puts a single writer task in front of it
//! so callers never wait on the disk. Queued writes are coalesced (only the
//! newest pending payload is written) and never interleave.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::{Result, TelemetryBridgeError};
use crate::events::EventBridge;

/// Writes the snapshot file.
#[derive(Debug, Clone)]
pub struct PayloadSink {
    path: PathBuf,
    pretty: bool,
}

impl PayloadSink {
    /// Create a sink writing to `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Snapshot file, replaced on every write
    /// * `pretty` - Indent the JSON for humans
    pub fn new<P: Into<PathBuf>>(path: P, pretty: bool) -> Self {
        Self {
            path: path.into(),
            pretty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist_error(&self, source: std::io::Error) -> TelemetryBridgeError {
        TelemetryBridgeError::Persist {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Replace the snapshot with `payload`
    ///
    /// Creates missing parent directories. Readers never observe a partially
    /// written file.
    ///
    /// # Errors
    ///
    /// Returns `Persist` if the payload cannot be encoded or the file cannot
    /// be written.
    pub async fn write<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(payload)
        } else {
            serde_json::to_vec(payload)
        }
        .map_err(|e| self.persist_error(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persist_error(e))?;
        }

        let tmp = self.temp_path();
        if let Err(e) = tokio::fs::write(&tmp, &encoded).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.persist_error(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.persist_error(e));
        }

        debug!("Snapshot written to {} ({} bytes)", self.path.display(), encoded.len());
        Ok(())
    }

    /// Read the snapshot back
    ///
    /// # Returns
    ///
    /// * `Result<Option<Value>>` - `None` if no snapshot has been written yet
    pub async fn read(&self) -> Result<Option<Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[derive(Debug)]
enum SinkCommand {
    Write(Arc<Value>),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front end of a [`PayloadSink`].
///
/// Cloning is cheap; every clone feeds the same writer task. Must be created
/// inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<SinkCommand>,
    current: Arc<watch::Sender<Option<Arc<Value>>>>,
    path: PathBuf,
}

impl SinkHandle {
    /// Start the writer task for `sink`
    ///
    /// Persistence failures are logged and published on the `error` channel
    /// of `events`.
    pub fn spawn(sink: PayloadSink, events: EventBridge) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (current, _) = watch::channel(None);
        let path = sink.path().to_path_buf();

        tokio::spawn(run_writer(sink, events, rx));

        Self {
            tx,
            current: Arc::new(current),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make `payload` the current snapshot and queue it for persistence
    ///
    /// Returns immediately; the disk write happens on the writer task.
    pub fn submit(&self, payload: Arc<Value>) {
        self.current.send_replace(Some(payload.clone()));
        if self.tx.send(SinkCommand::Write(payload)).is_err() {
            warn!("Snapshot writer is gone, payload not persisted");
        }
    }

    /// Latest submitted payload, if any
    pub fn current(&self) -> Option<Arc<Value>> {
        self.current.borrow().clone()
    }

    /// Receiver that is notified whenever the current snapshot changes
    pub fn watch(&self) -> watch::Receiver<Option<Arc<Value>>> {
        self.current.subscribe()
    }

    /// Wait until every payload submitted before this call has been handled
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(SinkCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_writer(
    sink: PayloadSink,
    events: EventBridge,
    mut rx: mpsc::UnboundedReceiver<SinkCommand>,
) {
    while let Some(command) = rx.recv().await {
        let mut latest = None;
        let mut acks = Vec::new();

        match command {
            SinkCommand::Write(payload) => latest = Some(payload),
            SinkCommand::Flush(ack) => acks.push(ack),
        }

        // Coalesce whatever queued up while the previous write ran
        while let Ok(command) = rx.try_recv() {
            match command {
                SinkCommand::Write(payload) => latest = Some(payload),
                SinkCommand::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(payload) = latest {
            if let Err(e) = sink.write(&payload).await {
                warn!("{}", e);
                events.report(&e);
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }

    debug!("Snapshot writer for {} stopped", sink.path().display());
}
