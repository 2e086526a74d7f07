//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; an empty file yields the
//! defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryBridgeError};

/// Baud rates the receiver sketch can be built with
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Accepted `logging.level` values
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Port address; empty means pick one automatically
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Snapshot file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,

    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; empty logs to the console only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_serial_port() -> String { String::new() }
fn default_baud_rate() -> u32 { 115200 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_output_path() -> String { "./lora_payload_sample.json".to_string() }
fn default_pretty() -> bool { true }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            auto_reconnect: false,
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            pretty: default_pretty(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> TelemetryBridgeError {
    TelemetryBridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_telemetry_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Called by [`Config::load`]; call it again after applying command-line
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns `Config` if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                SUPPORTED_BAUD_RATES
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.sink.output_path.trim().is_empty() {
            return Err(invalid("sink output_path cannot be empty"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Configured port, or `None` when it should be picked automatically
    pub fn port(&self) -> Option<&str> {
        let port = self.serial.port.trim();
        (!port.is_empty()).then_some(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.reconnect_interval_ms, 1000);
        assert!(!config.serial.auto_reconnect);
        assert_eq!(config.sink.output_path, "./lora_payload_sample.json");
        assert!(config.sink.pretty);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.port(), None);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.serial.baud_rate, default_baud_rate());
        assert_eq!(config.sink.output_path, default_output_path());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 57600
auto_reconnect = true

[sink]
output_path = "/tmp/telemetry.json"
pretty = false

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.port(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.baud_rate, 57600);
        assert!(config.serial.auto_reconnect);
        assert_eq!(config.serial.reconnect_interval_ms, 1000);
        assert_eq!(config.sink.output_path, "/tmp/telemetry.json");
        assert!(!config.sink.pretty);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.log_dir.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/lora-bridge.toml");
        assert!(matches!(result, Err(TelemetryBridgeError::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[serial\nport = ");
        assert!(matches!(result, Err(TelemetryBridgeError::Config(_))));
    }

    #[test]
    fn test_unsupported_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("baud_rate must be one of"));
    }

    #[test]
    fn test_all_supported_baud_rates() {
        for &rate in SUPPORTED_BAUD_RATES {
            let mut config = Config::default();
            config.serial.baud_rate = rate;
            assert!(config.validate().is_ok(), "{} should be accepted", rate);
        }
    }

    #[test]
    fn test_reconnect_interval_zero() {
        let mut config = Config::default();
        config.serial.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_interval_too_high() {
        let mut config = Config::default();
        config.serial.reconnect_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_output_path() {
        let mut config = Config::default();
        config.sink.output_path = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut config = Config::default();
        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_default_config() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml")).unwrap();
        assert_eq!(config.port(), None);
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.sink.output_path, "./lora_payload_sample.json");
    }

    #[test]
    fn test_blank_port_means_auto() {
        let mut config = Config::default();
        config.serial.port = "   ".to_string();
        assert_eq!(config.port(), None);
    }
}
