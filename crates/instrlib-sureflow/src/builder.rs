//! SureFlowBuilder: fluent builder for the SureFlow facade.
//!
//! # Example
//!
//! ```no_run
//! use instrlib_sureflow::builder::SureFlowBuilder;
//!
//! # async fn example() -> instrlib_core::Result<()> {
//! let meter = SureFlowBuilder::new()
//!     .serial_port("/dev/ttyUSB3")
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
use instrlib_core::types::{
    Classification, DeviceKind, InstrumentFamily, InstrumentInfo, ERR, NO_BOARD,
};
use instrlib_text_io::{Channel, ChannelConfig};

use crate::protocol::TERMINATOR;
use crate::sureflow::{read_serial, SureFlow};
use crate::MODEL;

/// Fluent builder for [`SureFlow`] (19200 baud, 200 ms).
#[derive(Clone)]
pub struct SureFlowBuilder {
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    command_timeout: Duration,
    lock: Option<Arc<dyn PortLock>>,
    refresh_on_connect: bool,
}

impl Default for SureFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SureFlowBuilder {
    /// Create a builder with the SureFlow link defaults.
    pub fn new() -> Self {
        SureFlowBuilder {
            serial_port: None,
            baud_rate: None,
            command_timeout: profile(InstrumentFamily::SureFlow).link.timeout,
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
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<SureFlow> {
        let port = self.serial_port.clone().unwrap_or_default();
        let channel = self.spawn(transport, port);
        self.finish(channel).await
    }

    /// Build on a locked serial port. Requires [`serial_port()`](Self::serial_port).
    pub async fn build(self) -> Result<SureFlow> {
        let port = self
            .serial_port
            .clone()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let baud = self
            .baud_rate
            .unwrap_or(profile(InstrumentFamily::SureFlow).link.baud_rate);

        let lock = self
            .lock
            .clone()
            .unwrap_or_else(instrlib_transport::platform_lock);
        let guard = lock.try_lock(&port)?;
        let transport = instrlib_transport::SerialTransport::open(&port, baud).await?;
        let channel = self.spawn(Box::new(transport), port).with_lock(guard);
        self.finish(channel).await
    }

    /// Build from a discovery hit, promoting its transport and lock.
    pub async fn build_from_probe(
        self,
        classification: &Classification,
        transport: Box<dyn Transport>,
        guard: LockGuard,
    ) -> Result<SureFlow> {
        let channel = self
            .spawn(transport, classification.port.clone())
            .with_lock(guard);
        self.finish(channel).await
    }

    fn spawn(&self, transport: Box<dyn Transport>, port: String) -> Channel {
        Channel::spawn(
            transport,
            port,
            ChannelConfig::new(TERMINATOR, self.command_timeout),
        )
    }

    /// Identity comes from the serial register. The identify reply only
    /// proves the meter is there, so a probe hit still reads it.
    async fn finish(&self, channel: Channel) -> Result<SureFlow> {
        let serial = match read_serial(&channel).await {
            s if s == ERR => {
                warn!(port = %channel.port(), "serial register unreadable");
                NO_BOARD.to_string()
            }
            s => s,
        };
        info!(port = %channel.port(), serial = %serial, "SureFlow connected");

        let info = InstrumentInfo {
            family: InstrumentFamily::SureFlow,
            kind: DeviceKind::FlowStandard,
            port: channel.port().to_string(),
            model_number: MODEL.to_string(),
            serial_number: serial,
        };
        let meter = SureFlow::new(channel, info);
        if self.refresh_on_connect {
            meter.update_values().await?;
        }
        Ok(meter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instrlib_core::types::Reading;
    use instrlib_test_harness::{MockLock, MockTransport};

    #[tokio::test]
    async fn identity_from_serial_register() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rA r76\r", b"A r76 = 012345\r");

        let m = SureFlowBuilder::new()
            .serial_port("/dev/ttyUSB3")
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert_eq!(m.info().serial_number, "12345");
        assert_eq!(m.info().model_number, MODEL);
        assert_eq!(m.info().kind, DeviceKind::FlowStandard);
    }

    #[tokio::test]
    async fn unreadable_serial_is_no_board() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rA r76\r", b"");

        let m = SureFlowBuilder::new()
            .command_timeout(Duration::from_millis(20))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert_eq!(m.info().serial_number, NO_BOARD);
    }

    #[tokio::test]
    async fn from_probe_reads_serial_and_first_flow() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rA r76\r", b"A r76 = 777\r");
        mock.expect(b"\rA\r", b"A +014.70 +022.1 +012.34 +011.98\r");
        let classification = Classification {
            port: "/dev/ttyUSB3".into(),
            family: InstrumentFamily::SureFlow,
            kind: DeviceKind::FlowStandard,
            response: "A +014.70 +022.1 +000.00 +000.00".into(),
        };

        let m = SureFlowBuilder::new()
            .refresh_on_connect(true)
            .build_from_probe(&classification, Box::new(mock), LockGuard::unlocked("/dev/ttyUSB3"))
            .await
            .unwrap();
        assert_eq!(m.info().serial_number, "777");
        assert_eq!(m.reading().await, Reading::new("11.98", "sccm"));
    }

    #[tokio::test]
    async fn busy_port_refused() {
        let mut lock = MockLock::new();
        lock.busy("/dev/ttyUSB3");
        let result = SureFlowBuilder::new()
            .serial_port("/dev/ttyUSB3")
            .lock(Arc::new(lock))
            .build()
            .await;
        assert!(matches!(result, Err(Error::LockUnavailable(_))));
    }
}
