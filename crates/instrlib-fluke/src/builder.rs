//! Fluke8846Builder and Fluke2700Builder: fluent builders for the Fluke
//! facades.
//!
//! Identity (model, serial number) comes from the `*idn?` reply, either the
//! one captured by discovery or a fresh exchange at build time.
//!
//! # Example
//!
//! ```no_run
//! use instrlib_fluke::builder::Fluke8846Builder;
//!
//! # async fn example() -> instrlib_core::Result<()> {
//! let meter = Fluke8846Builder::new()
//!     .serial_port("/dev/ttyUSB1")
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::identify::profile;
use instrlib_core::lock::{LockGuard, PortLock};
use instrlib_core::transport::Transport;
use instrlib_core::types::{Classification, DeviceKind, InstrumentFamily, InstrumentInfo, NO_BOARD};
use instrlib_text_io::{Channel, ChannelConfig};

use crate::commands;
use crate::fluke2700::Fluke2700;
use crate::fluke8846::Fluke8846;
use crate::protocol::{self, frame, TERMINATOR};

/// Settings shared by both Fluke builders.
#[derive(Clone)]
struct LinkOptions {
    family: InstrumentFamily,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    command_timeout: Duration,
    lock: Option<Arc<dyn PortLock>>,
    refresh_on_connect: bool,
}

impl LinkOptions {
    fn new(family: InstrumentFamily) -> Self {
        LinkOptions {
            family,
            serial_port: None,
            baud_rate: None,
            command_timeout: profile(family).link.timeout,
            lock: None,
            refresh_on_connect: false,
        }
    }

    fn spawn(&self, transport: Box<dyn Transport>, port: String) -> Channel {
        Channel::spawn(
            transport,
            port,
            ChannelConfig::new(TERMINATOR, self.command_timeout),
        )
    }

    async fn open(&self) -> Result<Channel> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let baud = self.baud_rate.unwrap_or(profile(self.family).link.baud_rate);

        let lock = self
            .lock
            .clone()
            .unwrap_or_else(instrlib_transport::platform_lock);
        let guard = lock.try_lock(port)?;
        let transport = instrlib_transport::SerialTransport::open(port, baud).await?;
        Ok(self.spawn(Box::new(transport), port.to_string()).with_lock(guard))
    }

    /// Resolve identity from `idn` or, when absent, a fresh `*idn?`.
    async fn info(&self, channel: &Channel, kind: DeviceKind, idn: Option<&str>) -> InstrumentInfo {
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
        info!(port = %channel.port(), family = %self.family, model = %model, serial = %serial, "Fluke connected");

        InstrumentInfo {
            family: self.family,
            kind,
            port: channel.port().to_string(),
            model_number: model,
            serial_number: serial,
        }
    }
}

/// A Fluke facade a [`FlukeBuilder`] can construct.
pub trait FlukeFacade: Instrument + Sized {
    /// Family whose link defaults apply.
    const FAMILY: InstrumentFamily;
    /// Device kind recorded in the facade's info.
    const KIND: DeviceKind;

    #[doc(hidden)]
    fn from_parts(channel: Channel, info: InstrumentInfo) -> Self;
}

impl FlukeFacade for Fluke8846 {
    const FAMILY: InstrumentFamily = InstrumentFamily::Fluke8846;
    const KIND: DeviceKind = DeviceKind::Multimeter;

    fn from_parts(channel: Channel, info: InstrumentInfo) -> Self {
        Fluke8846::new(channel, info)
    }
}

impl FlukeFacade for Fluke2700 {
    const FAMILY: InstrumentFamily = InstrumentFamily::Fluke2700;
    const KIND: DeviceKind = DeviceKind::PressureStandard;

    fn from_parts(channel: Channel, info: InstrumentInfo) -> Self {
        Fluke2700::new(channel, info)
    }
}

/// Fluent builder for a Fluke facade. Use the [`Fluke8846Builder`] and
/// [`Fluke2700Builder`] aliases.
pub struct FlukeBuilder<F> {
    options: LinkOptions,
    _facade: PhantomData<fn() -> F>,
}

/// Builder for [`Fluke8846`] (57600 baud, 1 s).
pub type Fluke8846Builder = FlukeBuilder<Fluke8846>;

/// Builder for [`Fluke2700`] (9600 baud, 300 ms).
pub type Fluke2700Builder = FlukeBuilder<Fluke2700>;

impl<F: FlukeFacade> Default for FlukeBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FlukeFacade> FlukeBuilder<F> {
    async fn finish(&self, channel: Channel, idn: Option<&str>) -> Result<F> {
        let info = self.options.info(&channel, F::KIND, idn).await;
        let facade = F::from_parts(channel, info);
        if self.options.refresh_on_connect {
            facade.update_values().await?;
        }
        Ok(facade)
    }

    /// Create a builder with the family's default link settings.
    pub fn new() -> Self {
        FlukeBuilder {
            options: LinkOptions::new(F::FAMILY),
            _facade: PhantomData,
        }
    }

    /// Set the serial port path.
    pub fn serial_port(mut self, port: &str) -> Self {
        self.options.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.options.baud_rate = Some(baud);
        self
    }

    /// Set the deadline for a single reply.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Use `lock` instead of the platform lock in [`build()`](Self::build).
    pub fn lock(mut self, lock: Arc<dyn PortLock>) -> Self {
        self.options.lock = Some(lock);
        self
    }

    /// Take a first reading before returning the facade.
    pub fn refresh_on_connect(mut self, enabled: bool) -> Self {
        self.options.refresh_on_connect = enabled;
        self
    }

    /// Build with a caller-provided transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<F> {
        let port = self.options.serial_port.clone().unwrap_or_default();
        let channel = self.options.spawn(transport, port);
        self.finish(channel, None).await
    }

    /// Build on a locked serial port. Requires [`serial_port()`](Self::serial_port).
    pub async fn build(self) -> Result<F> {
        let channel = self.options.open().await?;
        self.finish(channel, None).await
    }

    /// Build from a discovery hit, promoting its transport and lock.
    pub async fn build_from_probe(
        self,
        classification: &Classification,
        transport: Box<dyn Transport>,
        guard: LockGuard,
    ) -> Result<F> {
        let channel = self
            .options
            .spawn(transport, classification.port.clone())
            .with_lock(guard);
        self.finish(channel, Some(&classification.response)).await
    }
}
