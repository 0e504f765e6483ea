//! ExternalSensor: the Cordis external sensor board facade.
//!
//! The sensor board shares the controller's framing and identity keywords
//! but has its own range settings and a five-field status reply. It has no
//! model variants.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::types::{InstrumentInfo, Reading, NO_BOARD};
use instrlib_text_io::Channel;

use crate::commands;
use crate::exchange::{self, SetOutcome};
use crate::models::{ParseTelemetryError, MODEL_WRITE_KEYWORD, SERIAL_WRITE_KEYWORD};
use crate::protocol::{self, ReplyRule};
use crate::status::{self, SensorStatus};

/// An external sensor telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorTelemetry {
    SerialNumber,
    ModelNumber,
    OutputLow,
    OutputHigh,
    SensorLow,
    SensorHigh,
}

impl SensorTelemetry {
    /// Every channel, in refresh order.
    pub const ALL: [SensorTelemetry; 6] = [
        SensorTelemetry::SerialNumber,
        SensorTelemetry::ModelNumber,
        SensorTelemetry::OutputLow,
        SensorTelemetry::OutputHigh,
        SensorTelemetry::SensorLow,
        SensorTelemetry::SensorHigh,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            SensorTelemetry::SerialNumber => "serial_number",
            SensorTelemetry::ModelNumber => "model_number",
            SensorTelemetry::OutputLow => "output_low",
            SensorTelemetry::OutputHigh => "output_high",
            SensorTelemetry::SensorLow => "sensor_low",
            SensorTelemetry::SensorHigh => "sensor_high",
        }
    }

    /// Query keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            SensorTelemetry::SerialNumber => "SN",
            SensorTelemetry::ModelNumber => "ID",
            SensorTelemetry::OutputLow => "OUT_LOW",
            SensorTelemetry::OutputHigh => "OUT_HIGH",
            SensorTelemetry::SensorLow => "SENSOR_LOW",
            SensorTelemetry::SensorHigh => "SENSOR_HIGH",
        }
    }

    /// Set keyword. Identity is written through the provisioning keywords.
    pub fn write_keyword(&self) -> &'static str {
        match self {
            SensorTelemetry::SerialNumber => SERIAL_WRITE_KEYWORD,
            SensorTelemetry::ModelNumber => MODEL_WRITE_KEYWORD,
            other => other.keyword(),
        }
    }
}

impl fmt::Display for SensorTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorTelemetry {
    type Err = ParseTelemetryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        SensorTelemetry::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(wanted) || t.keyword().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseTelemetryError::new(s))
    }
}

/// Last known value of every sensor field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSnapshot {
    pub serial_number: String,
    pub model_number: String,
    pub output_low: String,
    pub output_high: String,
    pub sensor_low: String,
    pub sensor_high: String,
    /// Most recent `?STAT` poll.
    pub status: SensorStatus,
}

impl SensorSnapshot {
    /// Identity set to [`NO_BOARD`], everything else empty.
    pub fn unknown() -> Self {
        SensorSnapshot {
            serial_number: NO_BOARD.into(),
            model_number: NO_BOARD.into(),
            output_low: String::new(),
            output_high: String::new(),
            sensor_low: String::new(),
            sensor_high: String::new(),
            status: SensorStatus::empty(),
        }
    }

    /// Cached value of one channel.
    pub fn get(&self, telemetry: SensorTelemetry) -> &str {
        match telemetry {
            SensorTelemetry::SerialNumber => &self.serial_number,
            SensorTelemetry::ModelNumber => &self.model_number,
            SensorTelemetry::OutputLow => &self.output_low,
            SensorTelemetry::OutputHigh => &self.output_high,
            SensorTelemetry::SensorLow => &self.sensor_low,
            SensorTelemetry::SensorHigh => &self.sensor_high,
        }
    }

    fn slot(&mut self, telemetry: SensorTelemetry) -> &mut String {
        match telemetry {
            SensorTelemetry::SerialNumber => &mut self.serial_number,
            SensorTelemetry::ModelNumber => &mut self.model_number,
            SensorTelemetry::OutputLow => &mut self.output_low,
            SensorTelemetry::OutputHigh => &mut self.output_high,
            SensorTelemetry::SensorLow => &mut self.sensor_low,
            SensorTelemetry::SensorHigh => &mut self.sensor_high,
        }
    }
}

/// A connected Cordis external sensor board.
///
/// Constructed via [`SensorBuilder`](crate::builder::SensorBuilder).
pub struct ExternalSensor {
    channel: Channel,
    info: InstrumentInfo,
    snapshot: Mutex<SensorSnapshot>,
}

impl ExternalSensor {
    pub(crate) fn new(channel: Channel, info: InstrumentInfo) -> Self {
        let mut snapshot = SensorSnapshot::unknown();
        snapshot.serial_number = info.serial_number.clone();
        snapshot.model_number = info.model_number.clone();
        ExternalSensor {
            channel,
            info,
            snapshot: Mutex::new(snapshot),
        }
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> SensorSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Stop the channel.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Read one channel and cache it.
    pub async fn get_telemetry(&self, telemetry: SensorTelemetry) -> String {
        let mut snap = self.snapshot.lock().await;
        self.read_locked(&mut snap, telemetry).await
    }

    /// Write one channel. The cached field takes the echoed value on
    /// success and the whole echo (or an error marker) otherwise.
    pub async fn set_telemetry(&self, telemetry: SensorTelemetry, value: &str) -> SetOutcome {
        let mut snap = self.snapshot.lock().await;
        let keyword = telemetry.write_keyword();
        debug!(port = %self.channel.port(), %telemetry, keyword, value, "setting sensor telemetry");
        let (outcome, cached) = exchange::set(&self.channel, keyword, value).await;
        *snap.slot(telemetry) = cached;
        outcome
    }

    /// Poll `?STAT` and cache the five-field result.
    pub async fn get_status(&self) -> SensorStatus {
        let mut snap = self.snapshot.lock().await;
        self.status_locked(&mut snap).await
    }

    /// Reset the snapshot, then read the serial number and every range
    /// setting. A failed serial number read aborts the refresh.
    pub async fn refresh_all(&self) -> Result<()> {
        let mut snap = self.snapshot.lock().await;
        *snap = SensorSnapshot::unknown();

        let keyword = SensorTelemetry::SerialNumber.keyword();
        let serial = self
            .channel
            .exchange(protocol::format_query(keyword))
            .await
            .map_err(|e| {
                warn!(port = %self.channel.port(), error = %e, "serial number read failed, skipping refresh");
                e
            })?;
        snap.serial_number = protocol::parse_query_reply(keyword, &serial, ReplyRule::EchoedKeyword);

        for telemetry in &SensorTelemetry::ALL[1..] {
            self.read_locked(&mut snap, *telemetry).await;
        }

        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    /// Put every field back to the "no board" state.
    pub async fn reset_to_unknown(&self) {
        *self.snapshot.lock().await = SensorSnapshot::unknown();
    }

    /// Persist settings to board flash (`SAVE`).
    pub async fn save(&self) -> Result<String> {
        let _snap = self.snapshot.lock().await;
        exchange::command(&self.channel, commands::cmd_save()).await
    }

    async fn read_locked(&self, snap: &mut SensorSnapshot, telemetry: SensorTelemetry) -> String {
        let value = exchange::query(&self.channel, telemetry.keyword(), ReplyRule::EchoedKeyword).await;
        *snap.slot(telemetry) = value.clone();
        value
    }

    async fn status_locked(&self, snap: &mut SensorSnapshot) -> SensorStatus {
        let status = match self.channel.exchange(protocol::format_query("STAT")).await {
            Ok(line) => status::parse_sensor_status(&line),
            Err(e) => {
                debug!(port = %self.channel.port(), error = %e, "sensor status poll failed");
                SensorStatus::failed()
            }
        };
        snap.status = status.clone();
        status
    }
}

#[async_trait]
impl Instrument for ExternalSensor {
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
        let mut snap = self.snapshot.lock().await;
        self.status_locked(&mut snap).await;
        Ok(())
    }

    async fn reading(&self) -> Reading {
        Reading::new(self.snapshot.lock().await.status.output.clone(), "")
    }
}
