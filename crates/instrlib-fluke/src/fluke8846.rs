//! Fluke8846: the Fluke 8846A digital multimeter facade.
//!
//! Measurements are bracketed by `SYST:REM` / `SYST:LOC` so the front
//! panel is usable between polls. Remote and local commands produce no
//! reply and are sent without reading.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::types::{InstrumentInfo, Reading, ERR};
use instrlib_text_io::Channel;

use crate::commands;
use crate::protocol::{self, frame};

/// Last reading and configured unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterSnapshot {
    /// Last value (`V` as reported, `mA` rescaled from amps).
    pub value: String,
    /// `V`, `mA`, or [`ERR`].
    pub unit: String,
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        MeterSnapshot {
            value: "0".into(),
            unit: "V".into(),
        }
    }
}

/// A connected Fluke 8846A.
///
/// Constructed via [`Fluke8846Builder`](crate::builder::Fluke8846Builder).
pub struct Fluke8846 {
    channel: Channel,
    info: InstrumentInfo,
    snapshot: Mutex<MeterSnapshot>,
}

impl Fluke8846 {
    pub(crate) fn new(channel: Channel, info: InstrumentInfo) -> Self {
        Fluke8846 {
            channel,
            info,
            snapshot: Mutex::new(MeterSnapshot::default()),
        }
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> MeterSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Stop the channel.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Measure DC volts.
    pub async fn read_volts_dc(&self) -> Result<String> {
        let mut snap = self.snapshot.lock().await;
        snap.unit = "V".into();
        let raw = match self.measure(commands::MEAS_VOLT_DC).await {
            Ok(raw) => raw,
            Err(e) => {
                snap.value = ERR.into();
                return Err(e);
            }
        };
        snap.value = raw.trim().to_string();
        Ok(snap.value.clone())
    }

    /// Measure DC current, returned in milliamps.
    pub async fn read_current_dc(&self) -> Result<String> {
        let mut snap = self.snapshot.lock().await;
        snap.unit = "mA".into();
        let raw = match self.measure(commands::MEAS_CURR_DC).await {
            Ok(raw) => raw,
            Err(e) => {
                snap.value = ERR.into();
                return Err(e);
            }
        };
        snap.value = protocol::scale_for_unit(&raw, "mA");
        Ok(snap.value.clone())
    }

    /// Configure the meter for DC current.
    pub async fn set_current(&self) -> Result<()> {
        let mut snap = self.snapshot.lock().await;
        self.configure(commands::CONF_CURR_DC).await?;
        snap.unit = "mA".into();
        Ok(())
    }

    /// Configure the meter for DC volts.
    pub async fn set_voltage(&self) -> Result<()> {
        let mut snap = self.snapshot.lock().await;
        self.configure(commands::CONF_VOLT_DC).await?;
        snap.unit = "V".into();
        Ok(())
    }

    /// Remote, query, local. Local is sent even when the query fails.
    async fn measure(&self, command: &str) -> Result<String> {
        self.channel.send(frame(commands::REMOTE)).await?;
        let reply = self.channel.exchange(frame(command)).await;
        let local = self.channel.send(frame(commands::LOCAL)).await;
        let reply = reply?;
        local?;
        debug!(port = %self.channel.port(), command, reply = %reply, "measured");
        Ok(reply)
    }

    async fn configure(&self, command: &str) -> Result<()> {
        self.channel.send(frame(commands::REMOTE)).await?;
        let sent = self.channel.send(frame(command)).await;
        let local = self.channel.send(frame(commands::LOCAL)).await;
        sent?;
        local
    }
}

#[async_trait]
impl Instrument for Fluke8846 {
    fn info(&self) -> &InstrumentInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Read the configured function (`CONF?`) and the latest reading
    /// (`FETCH3?`).
    async fn update_values(&self) -> Result<()> {
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        let mut snap = self.snapshot.lock().await;

        snap.unit = match self.channel.exchange(frame(commands::CONF_QUERY)).await {
            Ok(reply) => protocol::parse_conf_unit(&reply),
            Err(e) => {
                debug!(port = %self.channel.port(), error = %e, "CONF? failed");
                ERR.into()
            }
        };
        snap.value = match self.channel.exchange(frame(commands::FETCH)).await {
            Ok(reply) => protocol::scale_for_unit(&reply, &snap.unit),
            Err(e) => {
                debug!(port = %self.channel.port(), error = %e, "FETCH3? failed");
                ERR.into()
            }
        };
        Ok(())
    }

    async fn reading(&self) -> Reading {
        let snap = self.snapshot.lock().await;
        Reading::new(snap.value.clone(), snap.unit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use instrlib_core::types::{DeviceKind, InstrumentFamily, NO_BOARD};
    use instrlib_test_harness::MockTransport;
    use instrlib_text_io::ChannelConfig;

    fn make_meter(mock: MockTransport) -> Fluke8846 {
        let channel = Channel::spawn(
            Box::new(mock),
            "/dev/ttyUSB1",
            ChannelConfig::new(protocol::TERMINATOR, Duration::from_millis(50)),
        );
        let info = InstrumentInfo {
            family: InstrumentFamily::Fluke8846,
            kind: DeviceKind::Multimeter,
            port: "/dev/ttyUSB1".into(),
            model_number: "8846A".into(),
            serial_number: NO_BOARD.into(),
        };
        Fluke8846::new(channel, info)
    }

    #[tokio::test]
    async fn volts_bracketed_by_remote_and_local() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rSYST:REM\r", b"");
        mock.expect(b"\rMEAS:VOLT:DC?\r", b"+1.23400000E+00\r");
        mock.expect(b"\rSYST:LOC\r", b"");
        let log = mock.log();
        let m = make_meter(mock);

        assert_eq!(m.read_volts_dc().await.unwrap(), "+1.23400000E+00");
        assert_eq!(log.sent().len(), 3);
        assert!(log.every_send_cleared_first());
        assert_eq!(m.reading().await.unit, "V");
    }

    #[tokio::test]
    async fn current_scaled_to_milliamps() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rSYST:REM\r", b"");
        mock.expect(b"\rMEAS:CURR:DC?\r", b"0.0125\r");
        mock.expect(b"\rSYST:LOC\r", b"");
        let m = make_meter(mock);

        assert_eq!(m.read_current_dc().await.unwrap(), "12.5");
        assert_eq!(m.reading().await, Reading::new("12.5", "mA"));
    }

    #[tokio::test]
    async fn failed_measure_still_returns_to_local() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rSYST:REM\r", b"");
        mock.expect(b"\rMEAS:VOLT:DC?\r", b"");
        mock.expect(b"\rSYST:LOC\r", b"");
        let log = mock.log();
        let m = make_meter(mock);

        assert!(matches!(m.read_volts_dc().await, Err(Error::Timeout)));
        assert_eq!(log.sent().last(), Some(&b"\rSYST:LOC\r".to_vec()));
    }

    #[tokio::test]
    async fn failed_measure_replaces_previous_value() {
        let mut mock = MockTransport::new();
        for reply in [&b"+1.5\r"[..], &b""[..]] {
            mock.expect(b"\rSYST:REM\r", b"");
            mock.expect(b"\rMEAS:VOLT:DC?\r", reply);
            mock.expect(b"\rSYST:LOC\r", b"");
        }
        mock.expect(b"\rSYST:REM\r", b"");
        mock.expect(b"\rMEAS:CURR:DC?\r", b"");
        mock.expect(b"\rSYST:LOC\r", b"");
        let m = make_meter(mock);

        assert_eq!(m.read_volts_dc().await.unwrap(), "+1.5");
        assert!(m.read_volts_dc().await.is_err());
        assert_eq!(m.reading().await, Reading::new(ERR, "V"));

        assert!(m.read_current_dc().await.is_err());
        assert_eq!(m.reading().await, Reading::new(ERR, "mA"));
    }

    #[tokio::test]
    async fn configure_current_then_voltage() {
        let mut mock = MockTransport::new();
        for conf in [&b"\rCONF:CURR:DC\r"[..], &b"\rCONF:VOLT:DC\r"[..]] {
            mock.expect(b"\rSYST:REM\r", b"");
            mock.expect(conf, b"");
            mock.expect(b"\rSYST:LOC\r", b"");
        }
        let m = make_meter(mock);

        m.set_current().await.unwrap();
        assert_eq!(m.snapshot().await.unit, "mA");
        m.set_voltage().await.unwrap();
        assert_eq!(m.snapshot().await.unit, "V");
    }

    #[tokio::test]
    async fn update_values_reads_unit_then_value() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rCONF?\r", b"\"CURR +1.00000000E-01,+1.00000000E-07\"\r");
        mock.expect(b"\rFETCH3?\r", b"0.002\r");
        let m = make_meter(mock);

        m.update_values().await.unwrap();
        assert_eq!(m.reading().await, Reading::new("2.0", "mA"));
    }

    #[tokio::test]
    async fn update_values_failures_are_err() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rCONF?\r", b"");
        mock.expect(b"\rFETCH3?\r", b"");
        let m = make_meter(mock);

        m.update_values().await.unwrap();
        assert_eq!(m.reading().await, Reading::new(ERR, ERR));
    }
}
