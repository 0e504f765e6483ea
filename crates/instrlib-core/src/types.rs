//! Core types used throughout instrlib.
//!
//! These types describe instruments independently of the driver crate that
//! talks to them: which family answered on a port, what kind of device it
//! is, how to reach it, and what it last reported.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identity sentinel used before a facade has identified its device, or
/// after an explicit reset.
pub const NO_BOARD: &str = "~No Board Found~";

/// Sentinel for a structured status field that could not be parsed.
pub const ERR: &str = "Err";

/// Instrument family, one per identify signature.
///
/// The family decides link settings, framing, and which driver crate
/// builds the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentFamily {
    /// Cordis flow controller or external sensor board (`?ID` replies `ID ...`).
    Cordis,
    /// Fluke 8846A digital multimeter.
    Fluke8846,
    /// Fluke 2700G pressure calibrator.
    Fluke2700,
    /// GE Druck PACE1000 pressure indicator.
    Pace1000,
    /// SureFlow flow standard.
    SureFlow,
}

impl InstrumentFamily {
    /// All families, in discovery priority order.
    pub const ALL: [InstrumentFamily; 5] = [
        InstrumentFamily::Fluke8846,
        InstrumentFamily::Fluke2700,
        InstrumentFamily::Pace1000,
        InstrumentFamily::Cordis,
        InstrumentFamily::SureFlow,
    ];

    /// The device kind a matching identify reply implies.
    ///
    /// Cordis boards need a follow-up exchange to tell a sensor from a
    /// controller; this returns the controller.
    pub fn default_kind(&self) -> DeviceKind {
        match self {
            InstrumentFamily::Cordis => DeviceKind::FlowController,
            InstrumentFamily::Fluke8846 => DeviceKind::Multimeter,
            InstrumentFamily::Fluke2700 | InstrumentFamily::Pace1000 => {
                DeviceKind::PressureStandard
            }
            InstrumentFamily::SureFlow => DeviceKind::FlowStandard,
        }
    }
}

impl fmt::Display for InstrumentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstrumentFamily::Cordis => "Cordis",
            InstrumentFamily::Fluke8846 => "Fluke 8846A",
            InstrumentFamily::Fluke2700 => "Fluke 2700G",
            InstrumentFamily::Pace1000 => "PACE1000",
            InstrumentFamily::SureFlow => "SureFlow",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into an [`InstrumentFamily`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFamilyError(String);

impl fmt::Display for ParseFamilyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown instrument family: '{}'. Expected: cordis, fluke8846, fluke2700, pace1000, sureflow",
            self.0
        )
    }
}

impl std::error::Error for ParseFamilyError {}

impl FromStr for InstrumentFamily {
    type Err = ParseFamilyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cordis" => Ok(InstrumentFamily::Cordis),
            "fluke8846" | "8846a" | "8846" => Ok(InstrumentFamily::Fluke8846),
            "fluke2700" | "2700g" | "2700" => Ok(InstrumentFamily::Fluke2700),
            "pace1000" | "pace" | "druck" => Ok(InstrumentFamily::Pace1000),
            "sureflow" => Ok(InstrumentFamily::SureFlow),
            _ => Err(ParseFamilyError(s.to_string())),
        }
    }
}

/// What a discovered device is, as far as a bench application cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Proportional flow controller board.
    FlowController,
    /// Pressure sensor board with a scaled analog output.
    ExternalSensor,
    /// Digital multimeter.
    Multimeter,
    /// Reference pressure gauge.
    PressureStandard,
    /// Reference flow meter.
    FlowStandard,
}

impl DeviceKind {
    /// The role this kind of device plays on a test bench.
    pub fn role(&self) -> DeviceRole {
        match self {
            DeviceKind::FlowController => DeviceRole::Control,
            DeviceKind::ExternalSensor
            | DeviceKind::PressureStandard
            | DeviceKind::FlowStandard => DeviceRole::Measurement,
            DeviceKind::Multimeter => DeviceRole::Electrical,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::FlowController => "Flow Controller",
            DeviceKind::ExternalSensor => "External Sensor",
            DeviceKind::Multimeter => "Multimeter",
            DeviceKind::PressureStandard => "Pressure Standard",
            DeviceKind::FlowStandard => "Flow Standard",
        };
        write!(f, "{s}")
    }
}

/// Bench role of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    /// Device under control (setpoints, valves).
    Control,
    /// Reference measurement.
    Measurement,
    /// Electrical measurement of the device under test.
    Electrical,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Control => write!(f, "Control"),
            DeviceRole::Measurement => write!(f, "Measurement"),
            DeviceRole::Electrical => write!(f, "Electrical"),
        }
    }
}

/// Serial link parameters for one instrument.
///
/// All supported instruments use 8N1 without flow control, so only the
/// baud rate and the per-exchange timeout vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout for a single exchange.
    pub timeout: Duration,
}

impl LinkSettings {
    /// Create link settings from a baud rate and timeout.
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        LinkSettings { baud_rate, timeout }
    }
}

impl fmt::Display for LinkSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} baud, {} ms", self.baud_rate, self.timeout.as_millis())
    }
}

/// Line terminator an instrument family frames its messages with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminator {
    /// Carriage return (`\r`).
    Cr,
    /// Carriage return + line feed (`\r\n`).
    CrLf,
}

impl Terminator {
    /// Terminator bytes.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::Cr => b"\r",
            Terminator::CrLf => b"\r\n",
        }
    }
}

/// Outcome of a successful identify exchange on one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Port the instrument answered on.
    pub port: String,
    /// Family whose signature matched.
    pub family: InstrumentFamily,
    /// Device kind.
    pub kind: DeviceKind,
    /// Decoded identify reply, terminator stripped.
    pub response: String,
}

/// A single measured value with its unit.
///
/// Values stay strings, exactly as the instrument reported them. The unit
/// is empty when the instrument does not report one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// Reported value.
    pub value: String,
    /// Unit label (`"V"`, `"mA"`, `"psi"`, ...).
    pub unit: String,
}

impl Reading {
    /// Create a reading.
    pub fn new(value: impl Into<String>, unit: impl Into<String>) -> Self {
        Reading {
            value: value.into(),
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

/// Static information about a connected instrument.
///
/// Identity is captured once when the facade is built and does not change
/// for the facade's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentInfo {
    /// Instrument family.
    pub family: InstrumentFamily,
    /// Device kind.
    pub kind: DeviceKind,
    /// Port the instrument is connected on.
    pub port: String,
    /// Model number as reported by the device, or [`NO_BOARD`].
    pub model_number: String,
    /// Serial number as reported by the device, or [`NO_BOARD`].
    pub serial_number: String,
}
