//! Serial port transport for instrument communication.
//!
//! This module provides [`SerialTransport`], which implements the [`Transport`]
//! trait for USB virtual COM ports and physical RS-232 connections, and
//! [`SerialOpener`], the [`PortOpener`] the discovery sweep uses.
//!
//! Every supported instrument runs 8N1 without flow control; only the baud
//! rate differs per family:
//! - Cordis flow controllers and sensors: 57600 baud
//! - Fluke 8846A: 57600 baud
//! - Fluke 2700G: 9600 baud
//! - GE Druck PACE1000: 57600 baud
//! - SureFlow: 19200 baud
//!
//! # Example
//!
//! ```no_run
//! use instrlib_transport::SerialTransport;
//! use instrlib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> instrlib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 57600).await?;
//!
//! transport.clear_buffers().await?;
//! transport.send(b"?SN\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_millis(400)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use instrlib_core::error::{Error, Result};
use instrlib_core::transport::{PortOpener, Transport};
use instrlib_core::types::LinkSettings;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

/// Serial port transport for instrument communication.
pub struct SerialTransport {
    /// The underlying serial port stream
    port: Option<SerialStream>,
    /// Port name for logging/debugging
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port at `baud_rate`, 8N1, no flow control.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
    /// * `baud_rate` - Baud rate (e.g., 9600, 19200, 57600)
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        tracing::debug!(port = %port, baud_rate, "Opening serial port");

        let serial_stream = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::debug!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        tracing::info!(port = %port, baud_rate, "Serial port opened successfully");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn is_link_down(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::ConnectionReset
    )
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = %String::from_utf8_lossy(data).escape_debug(),
            "Sending data"
        );

        if let Err(e) = port.write_all(data).await {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            return Err(Error::WriteFailure(e.to_string()));
        }

        if let Err(e) = port.flush().await {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            return Err(Error::WriteFailure(e.to_string()));
        }

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = %String::from_utf8_lossy(&buf[..n]).escape_debug(),
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::warn!(port = %self.port_name, error = %e, "Failed to receive data");
                if is_link_down(e.kind()) {
                    Err(Error::NotConnected)
                } else {
                    Err(Error::Io(e))
                }
            }
            Err(_) => {
                tracing::trace!(
                    port = %self.port_name,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for data"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn clear_buffers(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.clear(ClearBuffer::All).map_err(|e| {
            tracing::warn!(port = %self.port_name, error = %e, "Failed to clear buffers");
            Error::Transport(format!("Failed to clear buffers on {}: {}", self.port_name, e))
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }
            tracing::debug!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

/// Opens [`SerialTransport`]s for the discovery sweep and the builders.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

#[async_trait]
impl PortOpener for SerialOpener {
    async fn open(&self, port: &str, link: &LinkSettings) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open(port, link.baud_rate).await?;
        Ok(Box::new(transport))
    }
}

/// List the serial ports the operating system reports.
///
/// Returns an empty list when enumeration fails.
pub fn available_ports() -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to enumerate serial ports");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_nonexistent_port_is_transport_error() {
        let result = SerialTransport::open("/dev/instrlib-does-not-exist", 57600).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn opener_reports_open_failure() {
        let link = LinkSettings::new(9600, Duration::from_millis(300));
        let result = SerialOpener.open("/dev/instrlib-does-not-exist", &link).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn link_down_kinds() {
        assert!(is_link_down(ErrorKind::BrokenPipe));
        assert!(is_link_down(ErrorKind::NotConnected));
        assert!(!is_link_down(ErrorKind::InvalidData));
    }
}
