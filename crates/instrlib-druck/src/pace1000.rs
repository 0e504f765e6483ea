//! Pace1000: the GE Druck PACE1000 pressure standard facade.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::types::{InstrumentInfo, Reading, ERR};
use instrlib_text_io::Channel;

use crate::commands;
use crate::protocol::{self, frame};

/// Last pressure reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaceSnapshot {
    /// Pressure value, or [`ERR`].
    pub pressure: String,
    /// Pressure unit, or [`ERR`].
    pub unit: String,
}

/// A connected PACE1000.
///
/// Constructed via [`Pace1000Builder`](crate::builder::Pace1000Builder).
pub struct Pace1000 {
    channel: Channel,
    info: InstrumentInfo,
    snapshot: Mutex<PaceSnapshot>,
}

impl Pace1000 {
    pub(crate) fn new(channel: Channel, info: InstrumentInfo) -> Self {
        Pace1000 {
            channel,
            info,
            snapshot: Mutex::new(PaceSnapshot::default()),
        }
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> PaceSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Stop the channel.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Read the measured pressure. Returns [`ERR`] when the reply is unusable.
    pub async fn read_pressure(&self) -> String {
        let value = self.query(commands::PRESSURE).await;
        self.snapshot.lock().await.pressure = value.clone();
        value
    }

    /// Read the pressure unit. Returns [`ERR`] when the reply is unusable.
    pub async fn read_unit(&self) -> String {
        let value = self.query(commands::UNIT).await;
        self.snapshot.lock().await.unit = value.clone();
        value
    }

    async fn query(&self, command: &str) -> String {
        match self.channel.exchange(frame(command)).await {
            Ok(reply) => protocol::parse_value_reply(&reply).unwrap_or_else(|| {
                debug!(port = %self.channel.port(), command, reply = %reply, "unusable reply");
                ERR.to_string()
            }),
            Err(e) => {
                debug!(port = %self.channel.port(), command, error = %e, "query failed");
                ERR.to_string()
            }
        }
    }
}

#[async_trait]
impl Instrument for Pace1000 {
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
        self.read_pressure().await;
        self.read_unit().await;
        Ok(())
    }

    async fn reading(&self) -> Reading {
        let snap = self.snapshot.lock().await;
        Reading::new(snap.pressure.clone(), snap.unit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use instrlib_core::types::{DeviceKind, InstrumentFamily};
    use instrlib_test_harness::MockTransport;
    use instrlib_text_io::ChannelConfig;

    fn make_pace(mock: MockTransport) -> Pace1000 {
        let channel = Channel::spawn(
            Box::new(mock),
            "/dev/ttyUSB2",
            ChannelConfig::new(protocol::TERMINATOR, Duration::from_millis(50)),
        );
        let info = InstrumentInfo {
            family: InstrumentFamily::Pace1000,
            kind: DeviceKind::PressureStandard,
            port: "/dev/ttyUSB2".into(),
            model_number: "PACE1000".into(),
            serial_number: "1234567".into(),
        };
        Pace1000::new(channel, info)
    }

    #[tokio::test]
    async fn update_reads_pressure_then_unit() {
        let mut mock = MockTransport::new();
        mock.expect(b"\r\n:SENS:PRES?\r\n", b":SENS:PRES 14.6959\r\n");
        mock.expect(b"\r\n:UNIT:PRES?\r\n", b":UNIT:PRES PSI\r\n");
        let log = mock.log();
        let p = make_pace(mock);

        p.update_values().await.unwrap();
        assert_eq!(p.reading().await, Reading::new("14.6959", "PSI"));
        assert!(log.every_send_cleared_first());
    }

    #[tokio::test]
    async fn failures_are_err() {
        let mut mock = MockTransport::new();
        mock.expect(b"\r\n:SENS:PRES?\r\n", b"\r\n");
        mock.expect(b"\r\n:UNIT:PRES?\r\n", b"");
        let p = make_pace(mock);

        assert_eq!(p.read_pressure().await, ERR);
        assert_eq!(p.read_unit().await, ERR);
        assert_eq!(p.snapshot().await.pressure, ERR);
        assert!(p.is_connected());
    }

    #[tokio::test]
    async fn broken_channel_is_not_connected() {
        let mut mock = MockTransport::new();
        mock.fail_writes();
        let p = make_pace(mock);

        assert_eq!(p.read_pressure().await, ERR);
        assert!(!p.is_connected());
        assert!(matches!(p.update_values().await, Err(Error::NotConnected)));
    }
}
