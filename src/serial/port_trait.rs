//! Trait abstraction for opening serial ports to enable testing

use std::io;
use tokio::io::AsyncRead;
use tokio_serial::SerialPortBuilderExt;

/// Byte stream of an open port; dropping it closes the port
pub type PortStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens serial transports by address
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener: Send + Sync {
    /// Open `address` at `baud_rate`
    fn open(&self, address: &str, baud_rate: u32) -> io::Result<PortStream>;
}

/// [`PortOpener`] backed by `tokio_serial`, configured 8N1 without flow control
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSerialOpener;

impl PortOpener for TokioSerialOpener {
    fn open(&self, address: &str, baud_rate: u32) -> io::Result<PortStream> {
        let port = tokio_serial::new(address, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(io::Error::from)?;

        Ok(Box::new(port))
    }
}
