//! CordisController: the flow controller facade.
//!
//! Ties the Cordis codec ([`protocol`](crate::protocol),
//! [`status`](crate::status)) and the variant tables
//! ([`models`](crate::models)) to a [`Channel`]. Every operation holds the
//! facade's snapshot lock for its whole duration, so a running leak test
//! cannot interleave with other commands issued through the same facade.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::types::{InstrumentInfo, Reading, NO_BOARD};
use instrlib_text_io::Channel;

use crate::commands::{self, ValveCommand, VALVE_KEYWORD};
use crate::exchange::{self, SetOutcome};
use crate::models::{self, Access, ControllerVariant, RefreshStep, Telemetry};
use crate::protocol::{self, ReplyRule};
use crate::status::{self, ControllerStatus};

/// Last known value of every controller field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub serial_number: String,
    pub model_number: String,
    pub firmware: String,
    pub monitor: String,
    pub valve_lift_off: String,
    pub pid_p: String,
    pub pid_i: String,
    pub pid_d: String,
    pub command_zero: String,
    pub command_full_scale: String,
    pub monitor_zero: String,
    pub monitor_full_scale: String,
    pub sensor_zero: String,
    pub sensor_full_scale: String,
    pub command_type: String,
    pub current_command: String,
    pub inlet_bias: String,
    pub exhaust_bias: String,
    pub flow: String,
    pub cutoff: String,
    /// Most recent `?STAT` poll.
    pub status: ControllerStatus,
    /// Whether the inlet valve is enabled, as last commanded.
    pub inlet_enabled: bool,
    /// Whether the exhaust valve is enabled, as last commanded.
    pub exhaust_enabled: bool,
}

impl ControllerSnapshot {
    /// The "no board" snapshot: identity set to [`NO_BOARD`], everything
    /// else empty, both valves assumed enabled.
    pub fn unknown() -> Self {
        ControllerSnapshot {
            serial_number: NO_BOARD.into(),
            model_number: NO_BOARD.into(),
            firmware: String::new(),
            monitor: String::new(),
            valve_lift_off: String::new(),
            pid_p: String::new(),
            pid_i: String::new(),
            pid_d: String::new(),
            command_zero: String::new(),
            command_full_scale: String::new(),
            monitor_zero: String::new(),
            monitor_full_scale: String::new(),
            sensor_zero: String::new(),
            sensor_full_scale: String::new(),
            command_type: String::new(),
            current_command: String::new(),
            inlet_bias: String::new(),
            exhaust_bias: String::new(),
            flow: String::new(),
            cutoff: String::new(),
            status: ControllerStatus::empty(),
            inlet_enabled: true,
            exhaust_enabled: true,
        }
    }

    /// Cached value of one telemetry channel.
    pub fn get(&self, telemetry: Telemetry) -> &str {
        match telemetry {
            Telemetry::SerialNumber => &self.serial_number,
            Telemetry::ModelNumber => &self.model_number,
            Telemetry::Firmware => &self.firmware,
            Telemetry::Monitor => &self.monitor,
            Telemetry::ValveLiftOff => &self.valve_lift_off,
            Telemetry::PidP => &self.pid_p,
            Telemetry::PidI => &self.pid_i,
            Telemetry::PidD => &self.pid_d,
            Telemetry::CommandZero => &self.command_zero,
            Telemetry::CommandFullScale => &self.command_full_scale,
            Telemetry::MonitorZero => &self.monitor_zero,
            Telemetry::MonitorFullScale => &self.monitor_full_scale,
            Telemetry::SensorZero => &self.sensor_zero,
            Telemetry::SensorFullScale => &self.sensor_full_scale,
            Telemetry::CommandType => &self.command_type,
            Telemetry::CurrentCommand => &self.current_command,
            Telemetry::InletBias => &self.inlet_bias,
            Telemetry::ExhaustBias => &self.exhaust_bias,
            Telemetry::Flow => &self.flow,
            Telemetry::Cutoff => &self.cutoff,
        }
    }

    fn slot(&mut self, telemetry: Telemetry) -> &mut String {
        match telemetry {
            Telemetry::SerialNumber => &mut self.serial_number,
            Telemetry::ModelNumber => &mut self.model_number,
            Telemetry::Firmware => &mut self.firmware,
            Telemetry::Monitor => &mut self.monitor,
            Telemetry::ValveLiftOff => &mut self.valve_lift_off,
            Telemetry::PidP => &mut self.pid_p,
            Telemetry::PidI => &mut self.pid_i,
            Telemetry::PidD => &mut self.pid_d,
            Telemetry::CommandZero => &mut self.command_zero,
            Telemetry::CommandFullScale => &mut self.command_full_scale,
            Telemetry::MonitorZero => &mut self.monitor_zero,
            Telemetry::MonitorFullScale => &mut self.monitor_full_scale,
            Telemetry::SensorZero => &mut self.sensor_zero,
            Telemetry::SensorFullScale => &mut self.sensor_full_scale,
            Telemetry::CommandType => &mut self.command_type,
            Telemetry::CurrentCommand => &mut self.current_command,
            Telemetry::InletBias => &mut self.inlet_bias,
            Telemetry::ExhaustBias => &mut self.exhaust_bias,
            Telemetry::Flow => &mut self.flow,
            Telemetry::Cutoff => &mut self.cutoff,
        }
    }
}

/// Parameters for [`CordisController::leak_test`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakTestConfig {
    /// The test ends once `monitor - baseline` drops below this value.
    pub max_allowable: f64,
    /// Give up (and restore the valves) after this long.
    pub deadline: Option<Duration>,
    /// Pause between status polls.
    pub poll_interval: Duration,
}

impl Default for LeakTestConfig {
    fn default() -> Self {
        LeakTestConfig {
            max_allowable: -0.4,
            deadline: None,
            poll_interval: Duration::ZERO,
        }
    }
}

impl LeakTestConfig {
    /// Config with the given allowable drift and no deadline.
    pub fn new(max_allowable: f64) -> Self {
        LeakTestConfig {
            max_allowable,
            ..Self::default()
        }
    }

    /// Set the overall deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the pause between polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Whether `drift` is past `max_allowable`. A drift equal to the limit up
/// to f64 rounding (`99.6 - 100.0`) is not past it.
fn drifted_past(drift: f64, max_allowable: f64, baseline: f64) -> bool {
    let tolerance = 1e-9 * baseline.abs().max(1.0);
    drift < max_allowable - tolerance
}

/// Result of a completed leak test.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakTestReport {
    /// Monitor reading with both valves closed, before polling.
    pub baseline: f64,
    /// Monitor reading that ended the test.
    pub final_monitor: f64,
    /// `final_monitor - baseline`.
    pub drift: f64,
    /// Status polls made, baseline included.
    pub polls: usize,
    /// Wall time from baseline to the final poll.
    pub elapsed: Duration,
}

/// A connected Cordis flow controller.
///
/// Constructed via [`CordisBuilder`](crate::builder::CordisBuilder).
pub struct CordisController {
    channel: Channel,
    variant: ControllerVariant,
    info: InstrumentInfo,
    snapshot: Mutex<ControllerSnapshot>,
}

impl CordisController {
    pub(crate) fn new(channel: Channel, variant: ControllerVariant, info: InstrumentInfo) -> Self {
        let mut snapshot = ControllerSnapshot::unknown();
        snapshot.serial_number = info.serial_number.clone();
        snapshot.model_number = info.model_number.clone();
        CordisController {
            channel,
            variant,
            info,
            snapshot: Mutex::new(snapshot),
        }
    }

    /// Model variant resolved at identification.
    pub fn variant(&self) -> ControllerVariant {
        self.variant
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Current `(inlet, exhaust)` enable flags.
    pub async fn valve_state(&self) -> (bool, bool) {
        let snap = self.snapshot.lock().await;
        (snap.inlet_enabled, snap.exhaust_enabled)
    }

    /// Stop the channel. Later operations fail or record `NotConnected`.
    pub fn close(&self) {
        self.channel.close();
    }

    // -----------------------------------------------------------------
    // Telemetry
    // -----------------------------------------------------------------

    /// Read one telemetry channel and cache it.
    ///
    /// Channels the model lacks read as an empty string (or the model's
    /// fixed value) without touching the wire. A failed exchange reads as
    /// an error marker such as `error: Timeout`.
    pub async fn get_telemetry(&self, telemetry: Telemetry) -> String {
        let mut snap = self.snapshot.lock().await;
        self.read_locked(&mut snap, telemetry).await
    }

    /// Write one telemetry channel.
    ///
    /// The cached field takes the echoed value on success and the whole
    /// echo (or an error marker) otherwise. Read-only channels fail with
    /// [`Error::Unsupported`] without touching the wire.
    pub async fn set_telemetry(&self, telemetry: Telemetry, value: &str) -> Result<SetOutcome> {
        let keyword = models::write_keyword(self.variant, telemetry)
            .ok_or_else(|| Error::Unsupported(format!("{telemetry} is read-only")))?;

        let mut snap = self.snapshot.lock().await;
        debug!(port = %self.channel.port(), %telemetry, keyword, value, "setting telemetry");
        let (outcome, cached) = exchange::set(&self.channel, keyword, value).await;
        *snap.slot(telemetry) = cached;
        Ok(outcome)
    }

    /// Poll `?STAT` and cache the result.
    ///
    /// Returns empty fields on a model without a status channel and
    /// [`ERR`](instrlib_core::types::ERR) fields when the poll fails.
    pub async fn get_status(&self) -> ControllerStatus {
        let mut snap = self.snapshot.lock().await;
        self.status_locked(&mut snap).await
    }

    /// Reset the snapshot, then re-read everything.
    ///
    /// The serial number is read first. If that fails the snapshot stays
    /// reset and the error is returned; otherwise every field in the
    /// model's refresh batch is read in order, each failure landing in its
    /// own field. Valve flags are kept.
    pub async fn refresh_all(&self) -> Result<()> {
        let mut snap = self.snapshot.lock().await;
        let valves = (snap.inlet_enabled, snap.exhaust_enabled);
        *snap = ControllerSnapshot::unknown();
        snap.inlet_enabled = valves.0;
        snap.exhaust_enabled = valves.1;

        let serial = self
            .channel
            .exchange(protocol::format_query(Telemetry::SerialNumber.keyword()))
            .await
            .map_err(|e| {
                warn!(port = %self.channel.port(), error = %e, "serial number read failed, skipping refresh");
                e
            })?;
        snap.serial_number = protocol::parse_query_reply(
            Telemetry::SerialNumber.keyword(),
            &serial,
            ReplyRule::EchoedKeyword,
        );

        for step in models::refresh_batch(self.variant) {
            match step {
                RefreshStep::Read(telemetry) => {
                    self.read_locked(&mut snap, *telemetry).await;
                }
                RefreshStep::Status => {
                    self.status_locked(&mut snap).await;
                }
            }
        }

        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        debug!(port = %self.channel.port(), serial = %snap.serial_number, "refreshed");
        Ok(())
    }

    /// Put every field back to the "no board" state.
    pub async fn reset_to_unknown(&self) {
        *self.snapshot.lock().await = ControllerSnapshot::unknown();
    }

    /// Persist settings to board flash (`SAVE`). Returns the board's reply.
    pub async fn save(&self) -> Result<String> {
        let _snap = self.snapshot.lock().await;
        exchange::command(&self.channel, commands::cmd_save()).await
    }

    /// Start the board's auto-calibration (`AUTOC`). Returns the board's reply.
    pub async fn auto_calibrate(&self) -> Result<String> {
        let _snap = self.snapshot.lock().await;
        exchange::command(&self.channel, commands::cmd_auto_calibrate()).await
    }

    // -----------------------------------------------------------------
    // Valves
    // -----------------------------------------------------------------

    /// Enable both valves (`DVALVE: 0`).
    pub async fn enable_valves(&self) -> SetOutcome {
        self.valve(ValveCommand::EnableBoth).await
    }

    /// Disable both valves (`DVALVE: 5`).
    pub async fn disable_valves(&self) -> SetOutcome {
        self.valve(ValveCommand::DisableBoth).await
    }

    /// Enable the inlet valve (`DVALVE: 1`).
    pub async fn enable_inlet(&self) -> SetOutcome {
        self.valve(ValveCommand::EnableInlet).await
    }

    /// Disable the inlet valve (`DVALVE: 2`).
    pub async fn disable_inlet(&self) -> SetOutcome {
        self.valve(ValveCommand::DisableInlet).await
    }

    /// Enable the exhaust valve (`DVALVE: 3`).
    pub async fn enable_exhaust(&self) -> SetOutcome {
        self.valve(ValveCommand::EnableExhaust).await
    }

    /// Disable the exhaust valve (`DVALVE: 4`).
    pub async fn disable_exhaust(&self) -> SetOutcome {
        self.valve(ValveCommand::DisableExhaust).await
    }

    async fn valve(&self, command: ValveCommand) -> SetOutcome {
        let mut snap = self.snapshot.lock().await;
        self.valve_locked(&mut snap, command).await
    }

    // -----------------------------------------------------------------
    // Leak test
    // -----------------------------------------------------------------

    /// Close both valves and watch the monitor drift.
    ///
    /// Takes a baseline monitor reading, then polls status until
    /// `monitor - baseline` falls below `config.max_allowable`. The valves
    /// that were enabled beforehand are re-enabled whether the test
    /// completes, hits its deadline ([`Error::Timeout`]), or fails a poll.
    ///
    /// Not cancel-safe: dropping the future mid-poll (e.g. under
    /// `tokio::time::timeout`) skips the restore and leaves both valves
    /// closed. Bound the test with [`LeakTestConfig::deadline`] instead.
    pub async fn leak_test(&self, config: LeakTestConfig) -> Result<LeakTestReport> {
        if !self.variant.has_status() {
            return Err(Error::Unsupported(format!(
                "leak test needs a status channel, {} has none",
                self.variant
            )));
        }

        let mut snap = self.snapshot.lock().await;
        let saved = (snap.inlet_enabled, snap.exhaust_enabled);
        info!(port = %self.channel.port(), max_allowable = config.max_allowable, "leak test starting");

        let result = self.run_leak_test(&mut snap, &config).await;
        self.restore_valves(&mut snap, saved).await;

        match &result {
            Ok(report) => info!(
                port = %self.channel.port(),
                baseline = report.baseline,
                drift = report.drift,
                polls = report.polls,
                "leak test finished"
            ),
            Err(e) => warn!(port = %self.channel.port(), error = %e, "leak test aborted"),
        }
        result
    }

    async fn run_leak_test(
        &self,
        snap: &mut ControllerSnapshot,
        config: &LeakTestConfig,
    ) -> Result<LeakTestReport> {
        if !self
            .valve_locked(snap, ValveCommand::DisableBoth)
            .await
            .is_accepted()
        {
            return Err(Error::Malformed(format!(
                "{VALVE_KEYWORD} not acknowledged"
            )));
        }

        let started = Instant::now();
        let baseline = self.poll_monitor(snap).await?;
        let mut monitor = baseline;
        let mut polls = 1;

        while !drifted_past(monitor - baseline, config.max_allowable, baseline) {
            if let Some(deadline) = config.deadline {
                if started.elapsed() >= deadline {
                    return Err(Error::Timeout);
                }
            }
            if !config.poll_interval.is_zero() {
                tokio::time::sleep(config.poll_interval).await;
            }
            monitor = self.poll_monitor(snap).await?;
            polls += 1;
        }

        Ok(LeakTestReport {
            baseline,
            final_monitor: monitor,
            drift: monitor - baseline,
            polls,
            elapsed: started.elapsed(),
        })
    }

    async fn restore_valves(&self, snap: &mut ControllerSnapshot, (inlet, exhaust): (bool, bool)) {
        let command = match (inlet, exhaust) {
            (true, true) => ValveCommand::EnableBoth,
            (true, false) => ValveCommand::EnableInlet,
            (false, true) => ValveCommand::EnableExhaust,
            (false, false) => return,
        };
        if !self.valve_locked(snap, command).await.is_accepted() {
            warn!(port = %self.channel.port(), ?command, "failed to restore valves");
        }
    }

    /// Poll status and parse the monitor field.
    async fn poll_monitor(&self, snap: &mut ControllerSnapshot) -> Result<f64> {
        let status = self.status_locked(snap).await;
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        status
            .monitor
            .parse::<f64>()
            .map_err(|_| Error::Malformed(format!("monitor reading {:?}", status.monitor)))
    }

    // -----------------------------------------------------------------
    // Locked helpers
    // -----------------------------------------------------------------

    async fn read_locked(&self, snap: &mut ControllerSnapshot, telemetry: Telemetry) -> String {
        let value = match models::read_access(self.variant, telemetry) {
            Access::Query(keyword, rule) => exchange::query(&self.channel, keyword, rule).await,
            Access::Fixed(value) => value.to_string(),
            Access::Unavailable => String::new(),
        };
        *snap.slot(telemetry) = value.clone();
        value
    }

    async fn status_locked(&self, snap: &mut ControllerSnapshot) -> ControllerStatus {
        if !self.variant.has_status() {
            return ControllerStatus::empty();
        }
        let status = match self.channel.exchange(protocol::format_query("STAT")).await {
            Ok(line) => status::parse_controller_status(&line),
            Err(e) => {
                debug!(port = %self.channel.port(), error = %e, "status poll failed");
                ControllerStatus::failed()
            }
        };
        snap.monitor = status.monitor.clone();
        snap.status = status.clone();
        status
    }

    async fn valve_locked(&self, snap: &mut ControllerSnapshot, command: ValveCommand) -> SetOutcome {
        let code = command.code().to_string();
        let (outcome, _) = exchange::set(&self.channel, VALVE_KEYWORD, &code).await;
        if outcome.is_accepted() {
            command.apply(&mut snap.inlet_enabled, &mut snap.exhaust_enabled);
        }
        debug!(port = %self.channel.port(), ?command, ?outcome, "valve command");
        outcome
    }
}

#[async_trait]
impl Instrument for CordisController {
    fn info(&self) -> &InstrumentInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Poll status (standard models only).
    async fn update_values(&self) -> Result<()> {
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        let mut snap = self.snapshot.lock().await;
        self.status_locked(&mut snap).await;
        Ok(())
    }

    async fn reading(&self) -> Reading {
        Reading::new(self.snapshot.lock().await.monitor.clone(), "")
    }
}
