//! # LoRa Telemetry Bridge
//!
//! Read framed sensor telemetry from a LoRa receiver on a USB serial port,
//! keep the latest payload on disk and log a summary of each one.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use lora_telemetry_bridge::config::{Config, LoggingConfig};
use lora_telemetry_bridge::events::{EventBridge, PayloadEvent, StopReason};
use lora_telemetry_bridge::ports::{self, PortLister, SystemPortLister};
use lora_telemetry_bridge::serial::ConnectionManager;
use lora_telemetry_bridge::telemetry::{PayloadSink, SinkHandle, TelemetrySnapshot};

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "lora-telemetry-bridge.log";

/// LoRa telemetry bridge
#[derive(Parser, Debug)]
#[command(
    name = "lora-telemetry-bridge",
    version,
    about = "Bridge framed JSON telemetry from a LoRa receiver on a serial port",
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the detected serial ports as JSON and exit
    #[arg(long)]
    list_ports: bool,

    /// Serial port to open (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long, conflicts_with = "auto")]
    port: Option<String>,

    /// Pick the most likely receiver port automatically
    #[arg(long)]
    auto: bool,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Snapshot file for the latest payload
    #[arg(short, long)]
    output: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print every payload as pretty JSON
    #[arg(long)]
    mirror: bool,

    /// Print every line read from the serial port
    #[arg(long)]
    echo_lines: bool,
}

/// Which port to open
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Explicit(String),
    Auto,
}

impl Cli {
    /// Load the configuration file (if any) and apply command-line overrides
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(output) = &self.output {
            config.sink.output_path = output.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn target(&self, config: &Config) -> Target {
        match (&self.port, self.auto) {
            (Some(port), _) => Target::Explicit(port.clone()),
            (None, true) => Target::Auto,
            (None, false) => config
                .port()
                .map_or(Target::Auto, |port| Target::Explicit(port.to_string())),
        }
    }
}

/// Set up console logging plus an optional daily log file
///
/// Console logs go to stderr; stdout carries only `--list-ports`, `--mirror`
/// and `--echo-lines` output. `RUST_LOG` takes precedence over the configured
/// level. The returned guard must be kept alive for the file writer to flush.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let (file_layer, guard) = if logging.log_dir.trim().is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Open the target port, returning the address actually used
async fn open(manager: &ConnectionManager, target: &Target) -> lora_telemetry_bridge::error::Result<String> {
    match target {
        Target::Explicit(address) => {
            manager.connect(address).await?;
            Ok(address.clone())
        }
        Target::Auto => Ok(manager.auto_connect().await?.address),
    }
}

/// Write the port listing as pretty JSON and nothing else
fn write_port_listing(lister: &dyn PortLister, out: &mut impl Write) -> Result<()> {
    let listing = ports::enumerate(lister)?;
    serde_json::to_writer_pretty(&mut *out, &listing)?;
    writeln!(out)?;
    Ok(())
}

/// SIGTERM listener; never fires where there is no such signal
struct Terminate {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Terminate {
    /// Register the handler; must be called inside the runtime
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let signal = signal(SignalKind::terminate())
                .map_err(|e| warn!("Failed to listen for SIGTERM: {}", e))
                .ok();
            Self { signal }
        }

        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal.as_mut() {
                signal.recv().await;
                return;
            }
        }

        std::future::pending::<()>().await
    }
}

fn on_payload(event: &PayloadEvent, mirror: bool) {
    match TelemetrySnapshot::from_value(&event.payload) {
        Ok(snapshot) => info!("{}", snapshot.summary()),
        Err(e) => debug!("Payload does not match the sensor schema: {}", e),
    }

    if mirror {
        match serde_json::to_string_pretty(event.payload.as_ref()) {
            Ok(text) => println!("{}", text),
            Err(e) => warn!("Could not format payload: {}", e),
        }
    }
}

/// Main entry point for the LoRa telemetry bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and apply command-line overrides
///    - Set up logging
///    - Start the snapshot writer and open the serial port
///
/// 2. **Main Loop**
///    - Log a summary of every payload (optionally mirror it to stdout)
///    - Report recoverable errors
///    - On device removal, exit or retry every `reconnect_interval_ms`
///
/// 3. **Graceful Shutdown**
///    - Close the port on Ctrl+C (or SIGTERM on Unix)
///    - Wait for the latest snapshot to reach disk
///
/// # Examples
///
/// ```bash
/// lora-telemetry-bridge --auto --mirror
/// lora-telemetry-bridge --port /dev/ttyUSB0 --output telemetry.json
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let _log_guard = init_logging(&config.logging);

    if cli.list_ports {
        return write_port_listing(&SystemPortLister, &mut std::io::stdout().lock());
    }

    info!("LoRa Telemetry Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let events = EventBridge::new();
    let sink = SinkHandle::spawn(
        PayloadSink::new(&config.sink.output_path, config.sink.pretty),
        events.clone(),
    );
    let manager = ConnectionManager::new(config.serial.baud_rate, events.clone(), sink);

    let mut payloads = events.subscribe_payloads();
    let mut lines = events.subscribe_lines();
    let mut stopped = events.subscribe_stopped();
    let mut errors = events.subscribe_errors();

    let target = cli.target(&config);
    let retry_interval = Duration::from_millis(config.serial.reconnect_interval_ms);
    let mut retry_at: Option<Instant> = None;

    match open(&manager, &target).await {
        Ok(address) => info!("Listening for telemetry on {}", address),
        Err(e) if config.serial.auto_reconnect => {
            warn!("{}; retrying in {:?}", e, retry_interval);
            retry_at = Some(Instant::now() + retry_interval);
        }
        Err(e) => return Err(e).context("Failed to open serial port"),
    }

    info!("Writing latest payload to {}", manager.sink().path().display());
    info!("Press Ctrl+C to exit");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut terminate = Terminate::new();
    let mut payload_count: u64 = 0;

    loop {
        tokio::select! {
            event = payloads.recv() => match event {
                Ok(event) => {
                    payload_count += 1;
                    on_payload(&event, cli.mirror);
                }
                Err(RecvError::Lagged(n)) => warn!("Skipped {} payload events", n),
                Err(RecvError::Closed) => break,
            },

            line = lines.recv() => match line {
                Ok(line) if cli.echo_lines => println!("{}", line.text),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },

            event = errors.recv() => match event {
                Ok(event) => warn!("{:?}: {}", event.kind, event.message),
                Err(RecvError::Lagged(n)) => warn!("Skipped {} error events", n),
                Err(RecvError::Closed) => break,
            },

            event = stopped.recv() => match event {
                Ok(event) if event.reason == StopReason::TransportClosed => {
                    warn!("Connection to {} lost", event.address);
                    if !config.serial.auto_reconnect {
                        break;
                    }
                    retry_at = Some(Instant::now() + retry_interval);
                }
                Ok(event) => debug!("Connection to {} closed", event.address),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },

            _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                match open(&manager, &target).await {
                    Ok(address) => {
                        info!("Reconnected to {}", address);
                        retry_at = None;
                    }
                    Err(e) => {
                        debug!("Reconnect failed: {}", e);
                        retry_at = Some(Instant::now() + retry_interval);
                    }
                }
            }

            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down...");
                break;
            }

            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
        }
    }

    manager.disconnect().await;
    manager.sink().flush().await;
    info!("Total payloads received: {}", payload_count);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use lora_telemetry_bridge::error::TelemetryBridgeError;
    use lora_telemetry_bridge::ports::RawPortRecord;

    struct FixedLister(Vec<RawPortRecord>);

    impl PortLister for FixedLister {
        fn list(&self) -> lora_telemetry_bridge::error::Result<Vec<RawPortRecord>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_port_listing_output_is_pure_json() {
        let lister = FixedLister(vec![
            RawPortRecord {
                address: Some("/dev/ttyS0".to_string()),
                ..Default::default()
            },
            RawPortRecord {
                address: Some("/dev/ttyUSB0".to_string()),
                vendor_id: Some("1a86".to_string()),
                ..Default::default()
            },
        ]);

        let mut out = Vec::new();
        write_port_listing(&lister, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["autoSelected"], "/dev/ttyUSB0");
        assert_eq!(parsed["ports"].as_array().unwrap().len(), 2);
        assert!(text.starts_with('{'));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_port_listing_error_writes_nothing() {
        struct FailingLister;

        impl PortLister for FailingLister {
            fn list(&self) -> lora_telemetry_bridge::error::Result<Vec<RawPortRecord>> {
                Err(TelemetryBridgeError::Enumeration("denied".to_string()))
            }
        }

        let mut out = Vec::new();
        assert!(write_port_listing(&FailingLister, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let mut terminate = Terminate::new();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), terminate.recv())
            .await
            .expect("SIGTERM was not observed");
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_port_and_auto_conflict() {
        let result = Cli::try_parse_from(["lora-telemetry-bridge", "--port", "COM3", "--auto"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_target_resolution() {
        let mut config = Config::default();

        let cli = Cli::try_parse_from(["lora-telemetry-bridge"]).unwrap();
        assert_eq!(cli.target(&config), Target::Auto);

        config.serial.port = "/dev/ttyACM0".to_string();
        assert_eq!(cli.target(&config), Target::Explicit("/dev/ttyACM0".to_string()));

        let cli = Cli::try_parse_from(["lora-telemetry-bridge", "--auto"]).unwrap();
        assert_eq!(cli.target(&config), Target::Auto);

        let cli = Cli::try_parse_from(["lora-telemetry-bridge", "-p", "COM9"]).unwrap();
        assert_eq!(cli.target(&config), Target::Explicit("COM9".to_string()));
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "lora-telemetry-bridge",
            "--baud",
            "57600",
            "--output",
            "out.json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.sink.output_path, "out.json");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["lora-telemetry-bridge", "--baud", "420000"]).unwrap();
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_config_file_with_overrides() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\nport = \"COM4\"\nbaud_rate = 9600").unwrap();
        file.flush().unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["lora-telemetry-bridge", "--config", path, "--baud", "115200"])
            .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(cli.target(&config), Target::Explicit("COM4".to_string()));
    }
}
