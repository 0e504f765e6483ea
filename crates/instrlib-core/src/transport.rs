//! Transport traits for instrument communication.
//!
//! The [`Transport`] trait abstracts over the physical link to an
//! instrument. The production implementation is a serial port
//! (`instrlib-transport`); tests use `MockTransport` from the
//! `instrlib-test-harness` crate.
//!
//! [`PortOpener`] is the factory the discovery sweep uses to open a
//! transient connection on each candidate port at a family's link
//! settings.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::LinkSettings;

/// Asynchronous byte-level transport to an instrument.
///
/// Framing (terminators, prompt draining) is handled by the channel layer
/// that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the instrument.
    ///
    /// Implementations should return only once all bytes have been handed
    /// to the underlying port. A failed write is reported as
    /// [`Error::WriteFailure`](crate::error::Error::WriteFailure).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the instrument into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard anything pending in the input and output buffers.
    async fn clear_buffers(&mut self) -> Result<()>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Opens transports by port identifier.
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Open `port` with the given link settings.
    async fn open(&self, port: &str, link: &LinkSettings) -> Result<Box<dyn Transport>>;
}
