//! # Port Enumeration Module
//!
//! Lists serial devices and scores which one is most likely the LoRa receiver.
//!
//! ## Scoring
//!
//! A port is *preferred* when any of these hold:
//! - its manufacturer/product text mentions a known board or USB-serial chip
//!   (Arduino, Nano, CH340/WCH, CP210x/Silicon Labs, generic "USB-Serial")
//! - its USB vendor ID belongs to Arduino (`2341`, `2a03`) or to a common
//!   USB-serial bridge (`1a86` WCH, `10c4` Silicon Labs)
//! - its device address looks like a USB serial node (`ttyUSB`, `ttyACM`,
//!   `usbserial`, `wchusb`, `COM`)
//!
//! Scoring and sorting are pure functions over [`RawPortRecord`]s so they can be
//! tested without hardware; only [`SystemPortLister`] touches the OS.

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, TelemetryBridgeError};

/// Vendor IDs of dedicated Arduino boards
const ARDUINO_VENDOR_IDS: &[&str] = &["2341", "2a03"];

/// Vendor IDs of common USB-to-serial bridge chips (WCH CH340, Silicon Labs CP210x)
const USB_SERIAL_VENDOR_IDS: &[&str] = &["1a86", "10c4"];

/// Manufacturer/product keywords that mark a likely target
const PORT_KEYWORDS: &[&str] = &[
    "arduino",
    "nano",
    "ch340",
    "wch",
    "cp210",
    "silicon labs",
    "usb-serial",
];

/// Address fragments of USB serial device nodes
const ADDRESS_SLUGS: &[&str] = &["ttyusb", "ttyacm", "usbserial", "wchusb", "com"];

/// One port as reported by the OS, before scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPortRecord {
    pub address: Option<String>,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub friendly_name: Option<String>,
}

impl From<tokio_serial::SerialPortInfo> for RawPortRecord {
    fn from(info: tokio_serial::SerialPortInfo) -> Self {
        let mut record = RawPortRecord {
            address: Some(info.port_name),
            ..Default::default()
        };

        if let tokio_serial::SerialPortType::UsbPort(usb) = info.port_type {
            record.vendor_id = Some(format!("{:04x}", usb.vid));
            record.product_id = Some(format!("{:04x}", usb.pid));
            record.manufacturer = usb.manufacturer;
            record.serial_number = usb.serial_number;
            record.friendly_name = usb.product;
        }

        record
    }
}

/// A scored serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
    pub address: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub friendly_name: Option<String>,
    pub preferred: bool,
}

/// Result of one enumeration: sorted ports plus the default choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortListing {
    pub ports: Vec<PortDescriptor>,
    pub auto_selected: Option<String>,
}

impl PortListing {
    /// Look up a port by address
    pub fn get(&self, address: &str) -> Option<&PortDescriptor> {
        self.ports.iter().find(|port| port.address == address)
    }
}

/// Source of raw port records.
#[cfg_attr(test, mockall::automock)]
pub trait PortLister: Send + Sync {
    /// List the serial devices currently present
    fn list(&self) -> Result<Vec<RawPortRecord>>;
}

/// [`PortLister`] backed by the operating system's serial device listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortLister;

impl PortLister for SystemPortLister {
    fn list(&self) -> Result<Vec<RawPortRecord>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TelemetryBridgeError::Enumeration(e.to_string()))?;

        Ok(ports.into_iter().map(RawPortRecord::from).collect())
    }
}

/// Normalize a USB vendor/product ID to lowercase hex without a `0x` prefix
///
/// # Arguments
///
/// * `value` - Raw ID as reported by the OS (e.g. `"0x1A86"`)
///
/// # Returns
///
/// * `Option<String>` - Normalized ID, or `None` if nothing is left
///
/// # Examples
///
/// ```
/// use lora_telemetry_bridge::ports::normalize_hex;
///
/// assert_eq!(normalize_hex("0X1A86").as_deref(), Some("1a86"));
/// assert_eq!(normalize_hex("0x"), None);
/// ```
pub fn normalize_hex(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        None
    } else {
        Some(digits.to_ascii_lowercase())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Score one raw record
///
/// Returns `None` when the record has no usable address; such ports are
/// dropped from listings entirely.
pub fn describe(record: RawPortRecord) -> Option<PortDescriptor> {
    let address = non_empty(record.address)?;
    let manufacturer = non_empty(record.manufacturer);
    let friendly_name = non_empty(record.friendly_name);
    let vendor_id = record.vendor_id.as_deref().and_then(normalize_hex);
    let product_id = record.product_id.as_deref().and_then(normalize_hex);

    let haystack = format!(
        "{} {}",
        manufacturer.as_deref().unwrap_or_default(),
        friendly_name.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    let keyword_hit = PORT_KEYWORDS.iter().any(|keyword| haystack.contains(keyword));
    let vendor_hit = vendor_id.as_deref().is_some_and(|vid| {
        ARDUINO_VENDOR_IDS.contains(&vid) || USB_SERIAL_VENDOR_IDS.contains(&vid)
    });
    let lower_address = address.to_lowercase();
    let address_hit = ADDRESS_SLUGS.iter().any(|slug| lower_address.contains(slug));

    Some(PortDescriptor {
        address,
        manufacturer,
        serial_number: non_empty(record.serial_number),
        vendor_id,
        product_id,
        friendly_name,
        preferred: keyword_hit || vendor_hit || address_hit,
    })
}

/// Score, deduplicate and sort raw records into a [`PortListing`]
///
/// Preferred ports come first, each group sorted by address. The first record
/// wins when the OS reports the same address twice.
pub fn build_listing<I>(records: I) -> PortListing
where
    I: IntoIterator<Item = RawPortRecord>,
{
    let mut ports: Vec<PortDescriptor> = Vec::new();

    for descriptor in records.into_iter().filter_map(describe) {
        if ports.iter().any(|p| p.address == descriptor.address) {
            debug!("Skipping duplicate port entry {}", descriptor.address);
            continue;
        }
        ports.push(descriptor);
    }

    ports.sort_by(|a, b| {
        b.preferred
            .cmp(&a.preferred)
            .then_with(|| a.address.cmp(&b.address))
    });

    let auto_selected = select_auto_port(&ports);

    PortListing {
        ports,
        auto_selected,
    }
}

/// First preferred port, else the first port at all
pub fn select_auto_port(ports: &[PortDescriptor]) -> Option<String> {
    ports
        .iter()
        .find(|port| port.preferred)
        .or_else(|| ports.first())
        .map(|port| port.address.clone())
}

/// Enumerate and score the ports reported by `lister`
///
/// # Errors
///
/// Returns `Enumeration` if the listing itself fails. Not retried.
pub fn enumerate(lister: &dyn PortLister) -> Result<PortListing> {
    let listing = build_listing(lister.list()?);
    debug!(
        "Enumerated {} serial port(s), auto-selected {:?}",
        listing.ports.len(),
        listing.auto_selected
    );
    Ok(listing)
}
