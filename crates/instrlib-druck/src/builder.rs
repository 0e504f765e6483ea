//! Pace1000Builder: fluent builder for the PACE1000 facade.
//!
//! # Example
//!
//! ```no_run
//! use instrlib_druck::builder::Pace1000Builder;
//!
//! # async fn example() -> instrlib_core::Result<()> {
//! let pace = Pace1000Builder::new()
//!     .serial_port("/dev/ttyUSB2")
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use instrlib_core::error::{Error, Result};
use instrlib_core::identify::profile;
use instrlib_core::instrument::Instrument;
use instrlib_core::lock::{LockGuard, PortLock};
use instrlib_core::transport::Transport;
use instrlib_core::types::{Classification, DeviceKind, InstrumentFamily, InstrumentInfo, NO_BOARD};
use instrlib_text_io::{Channel, ChannelConfig};

use crate::commands;
use crate::pace1000::Pace1000;
use crate::protocol::{self, frame, TERMINATOR};

/// Fluent builder for [`Pace1000`] (57600 baud, 4 s).
#[derive(Clone)]
pub struct Pace1000Builder {
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    command_timeout: Duration,
    lock: Option<Arc<dyn PortLock>>,
    refresh_on_connect: bool,
}

impl Default for Pace1000Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Pace1000Builder {
    /// Create a builder with the PACE1000 link defaults.
    pub fn new() -> Self {
        Pace1000Builder {
            serial_port: None,
            baud_rate: None,
            command_timeout: profile(InstrumentFamily::Pace1000).link.timeout,
            lock: None,
            refresh_on_connect: false,
        }
    }

    /// Set the serial port path.
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Set the deadline for a single reply.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Use `lock` instead of the platform lock in [`build()`](Self::build).
    pub fn lock(mut self, lock: Arc<dyn PortLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Take a first reading before returning the facade.
    pub fn refresh_on_connect(mut self, enabled: bool) -> Self {
        self.refresh_on_connect = enabled;
        self
    }

    /// Build with a caller-provided transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Pace1000> {
        let port = self.serial_port.clone().unwrap_or_default();
        let channel = self.spawn(transport, port);
        self.finish(channel, None).await
    }

    /// Build on a locked serial port. Requires [`serial_port()`](Self::serial_port).
    pub async fn build(self) -> Result<Pace1000> {
        let port = self
            .serial_port
            .clone()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let baud = self
            .baud_rate
            .unwrap_or(profile(InstrumentFamily::Pace1000).link.baud_rate);

        let lock = self
            .lock
            .clone()
            .unwrap_or_else(instrlib_transport::platform_lock);
        let guard = lock.try_lock(&port)?;
        let transport = instrlib_transport::SerialTransport::open(&port, baud).await?;
        let channel = self.spawn(Box::new(transport), port).with_lock(guard);
        self.finish(channel, None).await
    }

    /// Build from a discovery hit, promoting its transport and lock.
    pub async fn build_from_probe(
        self,
        classification: &Classification,
        transport: Box<dyn Transport>,
        guard: LockGuard,
    ) -> Result<Pace1000> {
        let channel = self
            .spawn(transport, classification.port.clone())
            .with_lock(guard);
        self.finish(channel, Some(&classification.response)).await
    }

    fn spawn(&self, transport: Box<dyn Transport>, port: String) -> Channel {
        Channel::spawn(
            transport,
            port,
            ChannelConfig::new(TERMINATOR, self.command_timeout),
        )
    }

    async fn finish(&self, channel: Channel, idn: Option<&str>) -> Result<Pace1000> {
        let reply = match idn {
            Some(reply) => Some(reply.to_string()),
            None => match channel.exchange(frame(commands::IDN)).await {
                Ok(reply) => Some(reply),
                Err(e) => {
                    warn!(port = %channel.port(), error = %e, "*idn? failed");
                    None
                }
            },
        };
        let (model, serial) = reply
            .as_deref()
            .and_then(protocol::parse_idn)
            .unwrap_or_else(|| (NO_BOARD.to_string(), NO_BOARD.to_string()));
        info!(port = %channel.port(), model = %model, serial = %serial, "PACE1000 connected");

        let info = InstrumentInfo {
            family: InstrumentFamily::Pace1000,
            kind: DeviceKind::PressureStandard,
            port: channel.port().to_string(),
            model_number: model,
            serial_number: serial,
        };
        let pace = Pace1000::new(channel, info);
        if self.refresh_on_connect {
            pace.update_values().await?;
        }
        Ok(pace)
    }
}
