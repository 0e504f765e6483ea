//! SureFlow: the SureFlow reference flow meter facade.
//!
//! A single `A` poll returns pressure, temperature, volumetric and mass
//! flow together. A poll that cannot be decoded leaves the previous
//! values in place.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::types::{InstrumentInfo, Reading, ERR};
use instrlib_text_io::Channel;

use crate::commands;
use crate::protocol::{self, frame};

/// Unit of the primary reading.
pub const FLOW_UNIT: &str = "sccm";

/// Last decoded flow record. Fields are empty until the first good poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub pressure: String,
    pub temperature: String,
    pub ccm: String,
    pub sccm: String,
}

/// A connected SureFlow.
///
/// Constructed via [`SureFlowBuilder`](crate::builder::SureFlowBuilder).
pub struct SureFlow {
    channel: Channel,
    info: InstrumentInfo,
    snapshot: Mutex<FlowSnapshot>,
}

impl SureFlow {
    pub(crate) fn new(channel: Channel, info: InstrumentInfo) -> Self {
        SureFlow {
            channel,
            info,
            snapshot: Mutex::new(FlowSnapshot::default()),
        }
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> FlowSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Stop the channel.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Poll the flow record and return the mass flow, or [`ERR`].
    pub async fn read_flow(&self) -> String {
        let mut snap = self.snapshot.lock().await;
        let reply = match self.channel.exchange(frame(commands::FLOW)).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(port = %self.channel.port(), error = %e, "flow poll failed");
                return ERR.to_string();
            }
        };
        match protocol::parse_flow_record(&reply) {
            Some(record) => {
                snap.pressure = record.pressure;
                snap.temperature = record.temperature;
                snap.ccm = record.ccm;
                snap.sccm = record.sccm;
                snap.sccm.clone()
            }
            None => {
                debug!(port = %self.channel.port(), reply = %reply, "unusable flow record");
                ERR.to_string()
            }
        }
    }

    /// Read the serial number register, or [`ERR`].
    pub async fn read_serial(&self) -> String {
        read_serial(&self.channel).await
    }

    /// Whether the meter answers a flow poll.
    pub async fn check_alive(&self) -> bool {
        self.read_flow().await != ERR
    }
}

pub(crate) async fn read_serial(channel: &Channel) -> String {
    match channel.exchange(frame(commands::SERIAL)).await {
        Ok(reply) => protocol::parse_serial_reply(&reply).unwrap_or_else(|| {
            debug!(port = %channel.port(), reply = %reply, "unusable serial reply");
            ERR.to_string()
        }),
        Err(e) => {
            debug!(port = %channel.port(), error = %e, "serial read failed");
            ERR.to_string()
        }
    }
}

#[async_trait]
impl Instrument for SureFlow {
    fn info(&self) -> &InstrumentInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    async fn update_values(&self) -> Result<()> {
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        self.read_flow().await;
        Ok(())
    }

    async fn reading(&self) -> Reading {
        Reading::new(self.snapshot.lock().await.sccm.clone(), FLOW_UNIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use instrlib_core::types::{DeviceKind, InstrumentFamily, NO_BOARD};
    use instrlib_test_harness::MockTransport;
    use instrlib_text_io::ChannelConfig;

    fn make_meter(mock: MockTransport) -> SureFlow {
        let channel = Channel::spawn(
            Box::new(mock),
            "/dev/ttyUSB3",
            ChannelConfig::new(protocol::TERMINATOR, Duration::from_millis(50)),
        );
        let info = InstrumentInfo {
            family: InstrumentFamily::SureFlow,
            kind: DeviceKind::FlowStandard,
            port: "/dev/ttyUSB3".into(),
            model_number: NO_BOARD.into(),
            serial_number: "12345".into(),
        };
        SureFlow::new(channel, info)
    }

    #[tokio::test]
    async fn flow_poll_fills_snapshot() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rA\r", b"A +014.70 +022.1 +012.34 +011.98\r");
        let m = make_meter(mock);

        assert_eq!(m.read_flow().await, "11.98");
        let snap = m.snapshot().await;
        assert_eq!(snap.pressure, "14.7");
        assert_eq!(snap.temperature, "22.1");
        assert_eq!(snap.ccm, "12.34");
        assert_eq!(m.reading().await, Reading::new("11.98", "sccm"));
    }

    #[tokio::test]
    async fn bad_poll_keeps_previous_values() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rA\r", b"A +014.70 +022.1 +012.34 +011.98\r");
        mock.expect(b"\rA\r", b"A +014.70\r");
        mock.expect(b"\rA\r", b"");
        let m = make_meter(mock);

        assert!(m.check_alive().await);
        assert!(!m.check_alive().await);
        assert_eq!(m.read_flow().await, ERR);
        assert_eq!(m.snapshot().await.sccm, "11.98");
    }

    #[tokio::test]
    async fn serial_register() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rA r76\r", b"A r76 = 012345\r");
        mock.expect(b"\rA r76\r", b"?\r");
        let m = make_meter(mock);

        assert_eq!(m.read_serial().await, "12345");
        assert_eq!(m.read_serial().await, ERR);
    }

    #[tokio::test]
    async fn update_values_on_broken_channel() {
        let mut mock = MockTransport::new();
        mock.fail_writes();
        let m = make_meter(mock);

        assert_eq!(m.read_flow().await, ERR);
        assert!(matches!(m.update_values().await, Err(Error::NotConnected)));
    }
}
