//! CordisBuilder and SensorBuilder: fluent builders for the Cordis facades.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, locking, and timeouts before the port is opened.
//! Every build path reads the board's identity (`?ID`, `?SN`) once; the
//! controller's model variant is resolved from it.
//!
//! # Example
//!
//! ```no_run
//! use instrlib_cordis::builder::CordisBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> instrlib_core::Result<()> {
//! let controller = CordisBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .command_timeout(Duration::from_millis(500))
//!     .refresh_on_connect(true)
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
use instrlib_core::lock::{LockGuard, PortLock};
use instrlib_core::transport::Transport;
use instrlib_core::types::{Classification, DeviceKind, InstrumentFamily, InstrumentInfo, NO_BOARD};
use instrlib_text_io::{Channel, ChannelConfig};

use crate::controller::CordisController;
use crate::models::ControllerVariant;
use crate::protocol::{self, ReplyRule, TERMINATOR};
use crate::sensor::ExternalSensor;

/// Settings shared by both Cordis builders.
#[derive(Clone)]
struct LinkOptions {
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    command_timeout: Duration,
    lock: Option<Arc<dyn PortLock>>,
    refresh_on_connect: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            serial_port: None,
            baud_rate: None,
            command_timeout: profile(InstrumentFamily::Cordis).link.timeout,
            lock: None,
            refresh_on_connect: false,
        }
    }
}

impl LinkOptions {
    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(TERMINATOR, self.command_timeout)
    }

    fn port_name(&self) -> String {
        self.serial_port.clone().unwrap_or_default()
    }

    fn spawn(&self, transport: Box<dyn Transport>, port: String) -> Channel {
        Channel::spawn(transport, port, self.channel_config())
    }

    /// Lock and open the configured serial port.
    async fn open(&self) -> Result<Channel> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let baud = self
            .baud_rate
            .unwrap_or(profile(InstrumentFamily::Cordis).link.baud_rate);

        let lock = self
            .lock
            .clone()
            .unwrap_or_else(instrlib_transport::platform_lock);
        let guard = lock.try_lock(port)?;
        let transport = instrlib_transport::SerialTransport::open(port, baud).await?;
        Ok(self.spawn(Box::new(transport), port.to_string()).with_lock(guard))
    }
}

/// Read `keyword` for identity. Failures become [`NO_BOARD`].
async fn identity_query(channel: &Channel, keyword: &str) -> String {
    match channel.exchange(protocol::format_query(keyword)).await {
        Ok(line) => protocol::parse_query_reply(keyword, &line, ReplyRule::EchoedKeyword),
        Err(e) => {
            warn!(port = %channel.port(), keyword, error = %e, "identity read failed");
            NO_BOARD.to_string()
        }
    }
}

/// Read model and serial number. `id_reply` is the identify reply from
/// discovery, which saves the `?ID` exchange.
async fn identify(channel: &Channel, id_reply: Option<&str>) -> (String, String) {
    let model = match id_reply {
        Some(reply) => protocol::parse_query_reply("ID", reply, ReplyRule::EchoedKeyword),
        None => identity_query(channel, "ID").await,
    };
    let serial = identity_query(channel, "SN").await;
    (model, serial)
}

fn make_info(kind: DeviceKind, port: &str, model: String, serial: String) -> InstrumentInfo {
    InstrumentInfo {
        family: InstrumentFamily::Cordis,
        kind,
        port: port.to_string(),
        model_number: model,
        serial_number: serial,
    }
}

// ---------------------------------------------------------------------------
// CordisBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`CordisController`].
#[derive(Clone, Default)]
pub struct CordisBuilder {
    options: LinkOptions,
}

impl CordisBuilder {
    /// Create a builder with the Cordis defaults (57600 baud, 400 ms).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.options.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.options.baud_rate = Some(baud);
        self
    }

    /// Set the deadline for a single reply (default: 400ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Use `lock` instead of the platform lock in [`build()`](Self::build).
    pub fn lock(mut self, lock: Arc<dyn PortLock>) -> Self {
        self.options.lock = Some(lock);
        self
    }

    /// Run [`refresh_all`](CordisController::refresh_all) after connecting
    /// (default: off).
    pub fn refresh_on_connect(mut self, enabled: bool) -> Self {
        self.options.refresh_on_connect = enabled;
        self
    }

    /// Build a [`CordisController`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a `MockTransport`
    /// from `instrlib-test-harness`).
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<CordisController> {
        let port = self.options.port_name();
        let channel = self.options.spawn(transport, port);
        self.finish(channel, None).await
    }

    /// Build a [`CordisController`] on a locked serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<CordisController> {
        let channel = self.options.open().await?;
        self.finish(channel, None).await
    }

    /// Build a [`CordisController`] from a discovery hit, promoting the
    /// probe's transport and lock guard into the channel.
    pub async fn build_from_probe(
        self,
        classification: &Classification,
        transport: Box<dyn Transport>,
        guard: LockGuard,
    ) -> Result<CordisController> {
        let channel = self
            .options
            .spawn(transport, classification.port.clone())
            .with_lock(guard);
        self.finish(channel, Some(&classification.response)).await
    }

    async fn finish(self, channel: Channel, id_reply: Option<&str>) -> Result<CordisController> {
        let (model, serial) = identify(&channel, id_reply).await;
        let variant = ControllerVariant::from_model_number(&model);
        info!(port = %channel.port(), model = %model, serial = %serial, %variant, "Cordis controller connected");

        let info = make_info(DeviceKind::FlowController, channel.port(), model, serial);
        let controller = CordisController::new(channel, variant, info);
        if self.options.refresh_on_connect {
            if let Err(e) = controller.refresh_all().await {
                warn!(error = %e, "initial refresh failed");
            }
        }
        Ok(controller)
    }
}

// ---------------------------------------------------------------------------
// SensorBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`ExternalSensor`].
#[derive(Clone, Default)]
pub struct SensorBuilder {
    options: LinkOptions,
}

impl SensorBuilder {
    /// Create a builder with the Cordis defaults (57600 baud, 400 ms).
    pub fn new() -> Self {
        Self::default()
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

    /// Run [`refresh_all`](ExternalSensor::refresh_all) after connecting.
    pub fn refresh_on_connect(mut self, enabled: bool) -> Self {
        self.options.refresh_on_connect = enabled;
        self
    }

    /// Build an [`ExternalSensor`] with a caller-provided transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<ExternalSensor> {
        let port = self.options.port_name();
        let channel = self.options.spawn(transport, port);
        self.finish(channel, None).await
    }

    /// Build an [`ExternalSensor`] on a locked serial port.
    pub async fn build(self) -> Result<ExternalSensor> {
        let channel = self.options.open().await?;
        self.finish(channel, None).await
    }

    /// Build an [`ExternalSensor`] from a discovery hit.
    pub async fn build_from_probe(
        self,
        classification: &Classification,
        transport: Box<dyn Transport>,
        guard: LockGuard,
    ) -> Result<ExternalSensor> {
        let channel = self
            .options
            .spawn(transport, classification.port.clone())
            .with_lock(guard);
        self.finish(channel, Some(&classification.response)).await
    }

    async fn finish(self, channel: Channel, id_reply: Option<&str>) -> Result<ExternalSensor> {
        let (model, serial) = identify(&channel, id_reply).await;
        info!(port = %channel.port(), model = %model, serial = %serial, "Cordis external sensor connected");

        let info = make_info(DeviceKind::ExternalSensor, channel.port(), model, serial);
        let sensor = ExternalSensor::new(channel, info);
        if self.options.refresh_on_connect {
            if let Err(e) = sensor.refresh_all().await {
                warn!(error = %e, "initial refresh failed");
            }
        }
        Ok(sensor)
    }
}
