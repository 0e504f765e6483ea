//! Cordis model variants and their keyword tables.
//!
//! Every board model shares one protocol, but the CS-5090 lacks several
//! channels and renames two keywords. The differences live in the tables
//! below, keyed by [`ControllerVariant`], so the facade never tests the
//! model string itself.
//!
//! | Telemetry        | Standard | CS-5090          |
//! |------------------|----------|------------------|
//! | inlet bias       | `IBIAS`  | `BIAS`           |
//! | cutoff           | `CO`     | `CUTOFF` (4-char prefix reply) |
//! | command type     | `CT`     | always `0`       |
//! | current command  | `CC`     | always `0`       |
//! | firmware         | `FW`     | unavailable      |
//! | monitor          | `MON`    | unavailable      |
//! | status (`STAT`)  | yes      | unavailable      |

use std::fmt;
use std::str::FromStr;

use crate::protocol::ReplyRule;

/// Model marker that selects [`ControllerVariant::Cs5090`].
pub const CS5090_MARKER: &str = "CS-5090";

/// Keyword that writes the serial number (hex for `SERIAL`).
pub const SERIAL_WRITE_KEYWORD: &str = "53455249414C";

/// Keyword that writes the model number (hex for `MODEL`).
pub const MODEL_WRITE_KEYWORD: &str = "4D4F44454C";

/// Flow controller model variant, resolved once from the model number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerVariant {
    /// Full-featured controller.
    #[default]
    Standard,
    /// CS-5090: no status, firmware, or monitor channels.
    Cs5090,
}

impl ControllerVariant {
    /// Resolve the variant from a reported model number.
    pub fn from_model_number(model: &str) -> Self {
        if model.contains(CS5090_MARKER) {
            ControllerVariant::Cs5090
        } else {
            ControllerVariant::Standard
        }
    }

    /// Whether the board answers `?STAT`.
    pub fn has_status(&self) -> bool {
        matches!(self, ControllerVariant::Standard)
    }
}

impl fmt::Display for ControllerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerVariant::Standard => write!(f, "standard"),
            ControllerVariant::Cs5090 => write!(f, "CS-5090"),
        }
    }
}

/// A flow controller telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Telemetry {
    SerialNumber,
    ModelNumber,
    Firmware,
    Monitor,
    ValveLiftOff,
    PidP,
    PidI,
    PidD,
    CommandZero,
    CommandFullScale,
    MonitorZero,
    MonitorFullScale,
    SensorZero,
    SensorFullScale,
    CommandType,
    CurrentCommand,
    InletBias,
    ExhaustBias,
    Flow,
    Cutoff,
}

impl Telemetry {
    /// Every telemetry channel.
    pub const ALL: [Telemetry; 20] = [
        Telemetry::SerialNumber,
        Telemetry::ModelNumber,
        Telemetry::Firmware,
        Telemetry::Monitor,
        Telemetry::ValveLiftOff,
        Telemetry::PidP,
        Telemetry::PidI,
        Telemetry::PidD,
        Telemetry::CommandZero,
        Telemetry::CommandFullScale,
        Telemetry::MonitorZero,
        Telemetry::MonitorFullScale,
        Telemetry::SensorZero,
        Telemetry::SensorFullScale,
        Telemetry::CommandType,
        Telemetry::CurrentCommand,
        Telemetry::InletBias,
        Telemetry::ExhaustBias,
        Telemetry::Flow,
        Telemetry::Cutoff,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Telemetry::SerialNumber => "serial_number",
            Telemetry::ModelNumber => "model_number",
            Telemetry::Firmware => "firmware",
            Telemetry::Monitor => "monitor",
            Telemetry::ValveLiftOff => "valve_lift_off",
            Telemetry::PidP => "pid_p",
            Telemetry::PidI => "pid_i",
            Telemetry::PidD => "pid_d",
            Telemetry::CommandZero => "command_zero",
            Telemetry::CommandFullScale => "command_full_scale",
            Telemetry::MonitorZero => "monitor_zero",
            Telemetry::MonitorFullScale => "monitor_full_scale",
            Telemetry::SensorZero => "sensor_zero",
            Telemetry::SensorFullScale => "sensor_full_scale",
            Telemetry::CommandType => "command_type",
            Telemetry::CurrentCommand => "current_command",
            Telemetry::InletBias => "inlet_bias",
            Telemetry::ExhaustBias => "exhaust_bias",
            Telemetry::Flow => "flow",
            Telemetry::Cutoff => "cutoff",
        }
    }

    /// Query keyword on a standard board.
    pub fn keyword(&self) -> &'static str {
        match self {
            Telemetry::SerialNumber => "SN",
            Telemetry::ModelNumber => "ID",
            Telemetry::Firmware => "FW",
            Telemetry::Monitor => "MON",
            Telemetry::ValveLiftOff => "VLO",
            Telemetry::PidP => "PIDP",
            Telemetry::PidI => "PIDI",
            Telemetry::PidD => "PIDD",
            Telemetry::CommandZero => "CZERO",
            Telemetry::CommandFullScale => "CFS",
            Telemetry::MonitorZero => "MZERO",
            Telemetry::MonitorFullScale => "MFS",
            Telemetry::SensorZero => "SZERO",
            Telemetry::SensorFullScale => "SFS",
            Telemetry::CommandType => "CT",
            Telemetry::CurrentCommand => "CC",
            Telemetry::InletBias => "IBIAS",
            Telemetry::ExhaustBias => "EBIAS",
            Telemetry::Flow => "FLOW",
            Telemetry::Cutoff => "CO",
        }
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string names no telemetry channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTelemetryError(String);

impl fmt::Display for ParseTelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown telemetry: {}", self.0)
    }
}

impl std::error::Error for ParseTelemetryError {}

impl ParseTelemetryError {
    pub(crate) fn new(name: &str) -> Self {
        ParseTelemetryError(name.to_string())
    }
}

impl FromStr for Telemetry {
    type Err = ParseTelemetryError;

    /// Accepts the snake_case name or the standard keyword, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Telemetry::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(wanted) || t.keyword().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseTelemetryError(s.to_string()))
    }
}

/// How a telemetry channel is read on a given variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Query this keyword and decode with this rule.
    Query(&'static str, ReplyRule),
    /// The board has no such channel; reads return an empty value.
    Unavailable,
    /// The board has no such channel; reads return this constant.
    Fixed(&'static str),
}

/// Per-variant read overrides. Anything not listed uses
/// [`Telemetry::keyword`] with [`ReplyRule::EchoedKeyword`].
const READ_OVERRIDES: &[(ControllerVariant, Telemetry, Access)] = &[
    (
        ControllerVariant::Cs5090,
        Telemetry::InletBias,
        Access::Query("BIAS", ReplyRule::EchoedKeyword),
    ),
    (
        ControllerVariant::Cs5090,
        Telemetry::Cutoff,
        Access::Query("CUTOFF", ReplyRule::FixedPrefix(4)),
    ),
    (ControllerVariant::Cs5090, Telemetry::CommandType, Access::Fixed("0")),
    (ControllerVariant::Cs5090, Telemetry::CurrentCommand, Access::Fixed("0")),
    (ControllerVariant::Cs5090, Telemetry::Firmware, Access::Unavailable),
    (ControllerVariant::Cs5090, Telemetry::Monitor, Access::Unavailable),
];

/// Per-variant write keyword overrides.
const WRITE_OVERRIDES: &[(ControllerVariant, Telemetry, &str)] = &[
    (ControllerVariant::Cs5090, Telemetry::InletBias, "BIAS"),
    (ControllerVariant::Cs5090, Telemetry::Cutoff, "CUTOFF"),
];

/// Resolve how `telemetry` is read on `variant`.
pub fn read_access(variant: ControllerVariant, telemetry: Telemetry) -> Access {
    READ_OVERRIDES
        .iter()
        .find(|(v, t, _)| *v == variant && *t == telemetry)
        .map(|(_, _, access)| *access)
        .unwrap_or(Access::Query(telemetry.keyword(), ReplyRule::EchoedKeyword))
}

/// Resolve the set keyword for `telemetry` on `variant`.
///
/// Returns `None` for read-only channels (firmware, monitor).
pub fn write_keyword(variant: ControllerVariant, telemetry: Telemetry) -> Option<&'static str> {
    match telemetry {
        Telemetry::Firmware | Telemetry::Monitor => return None,
        Telemetry::SerialNumber => return Some(SERIAL_WRITE_KEYWORD),
        Telemetry::ModelNumber => return Some(MODEL_WRITE_KEYWORD),
        _ => {}
    }
    let keyword = WRITE_OVERRIDES
        .iter()
        .find(|(v, t, _)| *v == variant && *t == telemetry)
        .map(|(_, _, kw)| *kw)
        .unwrap_or(telemetry.keyword());
    Some(keyword)
}

/// One step of a full refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStep {
    /// Read one telemetry channel.
    Read(Telemetry),
    /// Poll `?STAT`.
    Status,
}

use RefreshStep::{Read, Status};

const CS5090_BATCH: &[RefreshStep] = &[
    Read(Telemetry::ModelNumber),
    Read(Telemetry::CommandZero),
    Read(Telemetry::CommandFullScale),
    Read(Telemetry::MonitorZero),
    Read(Telemetry::MonitorFullScale),
    Read(Telemetry::SensorZero),
    Read(Telemetry::SensorFullScale),
    Read(Telemetry::PidP),
    Read(Telemetry::PidI),
    Read(Telemetry::Cutoff),
    Read(Telemetry::InletBias),
    Read(Telemetry::Monitor),
    Read(Telemetry::CurrentCommand),
];

const STANDARD_BATCH: &[RefreshStep] = &[
    Read(Telemetry::ModelNumber),
    Read(Telemetry::CommandZero),
    Read(Telemetry::CommandFullScale),
    Read(Telemetry::MonitorZero),
    Read(Telemetry::MonitorFullScale),
    Read(Telemetry::SensorZero),
    Read(Telemetry::SensorFullScale),
    Read(Telemetry::PidP),
    Read(Telemetry::PidI),
    Read(Telemetry::Cutoff),
    Read(Telemetry::InletBias),
    Read(Telemetry::Monitor),
    Read(Telemetry::CurrentCommand),
    Read(Telemetry::CommandType),
    Read(Telemetry::ValveLiftOff),
    Read(Telemetry::ExhaustBias),
    Read(Telemetry::Flow),
    Status,
    Read(Telemetry::PidD),
    Read(Telemetry::Firmware),
];

/// Ordered steps of a full refresh, run after the serial number read
/// succeeds.
pub fn refresh_batch(variant: ControllerVariant) -> &'static [RefreshStep] {
    match variant {
        ControllerVariant::Standard => STANDARD_BATCH,
        ControllerVariant::Cs5090 => CS5090_BATCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_from_model() {
        assert_eq!(
            ControllerVariant::from_model_number("CS-5090 rev2"),
            ControllerVariant::Cs5090
        );
        assert_eq!(
            ControllerVariant::from_model_number("CS-1000"),
            ControllerVariant::Standard
        );
        assert_eq!(
            ControllerVariant::from_model_number(""),
            ControllerVariant::Standard
        );
    }

    #[test]
    fn standard_reads_use_plain_keywords() {
        for t in Telemetry::ALL {
            assert_eq!(
                read_access(ControllerVariant::Standard, t),
                Access::Query(t.keyword(), ReplyRule::EchoedKeyword)
            );
        }
    }

    #[test]
    fn cs5090_read_quirks() {
        let v = ControllerVariant::Cs5090;
        assert_eq!(
            read_access(v, Telemetry::InletBias),
            Access::Query("BIAS", ReplyRule::EchoedKeyword)
        );
        assert_eq!(
            read_access(v, Telemetry::Cutoff),
            Access::Query("CUTOFF", ReplyRule::FixedPrefix(4))
        );
        assert_eq!(read_access(v, Telemetry::CommandType), Access::Fixed("0"));
        assert_eq!(read_access(v, Telemetry::Firmware), Access::Unavailable);
        assert_eq!(read_access(v, Telemetry::Monitor), Access::Unavailable);
        assert_eq!(
            read_access(v, Telemetry::PidP),
            Access::Query("PIDP", ReplyRule::EchoedKeyword)
        );
    }

    #[test]
    fn write_keywords() {
        let std = ControllerVariant::Standard;
        let cs = ControllerVariant::Cs5090;
        assert_eq!(write_keyword(std, Telemetry::Cutoff), Some("CO"));
        assert_eq!(write_keyword(cs, Telemetry::Cutoff), Some("CUTOFF"));
        assert_eq!(write_keyword(cs, Telemetry::InletBias), Some("BIAS"));
        assert_eq!(write_keyword(cs, Telemetry::CommandType), Some("CT"));
        assert_eq!(write_keyword(std, Telemetry::SerialNumber), Some("53455249414C"));
        assert_eq!(write_keyword(std, Telemetry::ModelNumber), Some("4D4F44454C"));
        assert_eq!(write_keyword(std, Telemetry::Firmware), None);
        assert_eq!(write_keyword(cs, Telemetry::Monitor), None);
    }

    #[test]
    fn refresh_batches() {
        let standard = refresh_batch(ControllerVariant::Standard);
        let cs = refresh_batch(ControllerVariant::Cs5090);
        assert_eq!(standard.first(), Some(&Read(Telemetry::ModelNumber)));
        assert_eq!(standard.last(), Some(&Read(Telemetry::Firmware)));
        assert!(!standard.contains(&Read(Telemetry::SerialNumber)));
        assert!(standard.contains(&Status));
        assert!(!cs.contains(&Status));
        assert!(!cs.contains(&Read(Telemetry::Firmware)));
        assert!(standard.starts_with(cs));
    }

    #[test]
    fn telemetry_from_str() {
        assert_eq!("command_zero".parse::<Telemetry>(), Ok(Telemetry::CommandZero));
        assert_eq!("CZERO".parse::<Telemetry>(), Ok(Telemetry::CommandZero));
        assert_eq!("czero".parse::<Telemetry>(), Ok(Telemetry::CommandZero));
        assert_eq!("co".parse::<Telemetry>(), Ok(Telemetry::Cutoff));
        assert!("nonsense".parse::<Telemetry>().is_err());
    }

    #[test]
    fn telemetry_names_unique() {
        for (i, a) in Telemetry::ALL.iter().enumerate() {
            for b in &Telemetry::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
                assert_ne!(a.keyword(), b.keyword());
            }
        }
    }
}
