//! Status reply parsers.
//!
//! The controller answers `?STAT` with three double-space separated
//! `label:value` pairs:
//!
//! ```text
//! STAT: C:1.0  S:2.0  E:3.0
//! ```
//!
//! The external sensor answers with five ` | ` separated `label::value`
//! fields in a fixed order:
//!
//! ```text
//! ADC::1.234 | SL::0.0 | SH::5.0 | OL::0.5 | OH::4.5
//! ```
//!
//! Every field falls back to [`ERR`] on its own, so a damaged reply only
//! costs the fields it actually damaged.

use instrlib_core::types::ERR;

/// Marker that identifies a sensor status reply.
pub const SENSOR_STATUS_MARKER: &str = "ADC::";

/// Decoded controller status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Commanded setpoint (`C`).
    pub command: String,
    /// Monitor reading (`S`).
    pub monitor: String,
    /// Exhaust drive (`E`).
    pub exhaust: String,
}

impl ControllerStatus {
    /// A status with every field set to [`ERR`].
    pub fn failed() -> Self {
        ControllerStatus {
            command: ERR.into(),
            monitor: ERR.into(),
            exhaust: ERR.into(),
        }
    }

    /// A status with every field empty, used where the model has no status.
    pub fn empty() -> Self {
        ControllerStatus {
            command: String::new(),
            monitor: String::new(),
            exhaust: String::new(),
        }
    }
}

/// Decoded external sensor status, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorStatus {
    /// Live output reading.
    pub output: String,
    /// Sensor range low.
    pub sensor_low: String,
    /// Sensor range high.
    pub sensor_high: String,
    /// Output range low.
    pub out_low: String,
    /// Output range high.
    pub out_high: String,
}

impl SensorStatus {
    /// A status with every field set to [`ERR`].
    pub fn failed() -> Self {
        SensorStatus {
            output: ERR.into(),
            sensor_low: ERR.into(),
            sensor_high: ERR.into(),
            out_low: ERR.into(),
            out_high: ERR.into(),
        }
    }

    /// A status with every field empty, used before the first poll.
    pub fn empty() -> Self {
        SensorStatus {
            output: String::new(),
            sensor_low: String::new(),
            sensor_high: String::new(),
            out_low: String::new(),
            out_high: String::new(),
        }
    }

    fn slot(&mut self, index: usize) -> Option<&mut String> {
        match index {
            0 => Some(&mut self.output),
            1 => Some(&mut self.sensor_low),
            2 => Some(&mut self.sensor_high),
            3 => Some(&mut self.out_low),
            4 => Some(&mut self.out_high),
            _ => None,
        }
    }
}

/// Drop the line terminator, an echoed `STAT`, and any leading `:` or
/// whitespace.
fn strip_preamble(raw: &str) -> &str {
    let body = raw.trim_end_matches(['\r', '\n']);
    let body = body.strip_prefix("STAT").unwrap_or(body);
    body.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
}

fn is_clean_value(value: &str) -> bool {
    !value.is_empty() && !value.contains(':') && !value.contains(char::is_whitespace)
}

/// Parse a controller status reply.
///
/// # Example
///
/// ```
/// use instrlib_cordis::status::parse_controller_status;
///
/// let status = parse_controller_status(": C:1.0  S:2.0  E:3.0\r");
/// assert_eq!(status.command, "1.0");
/// assert_eq!(status.monitor, "2.0");
/// assert_eq!(status.exhaust, "3.0");
///
/// let status = parse_controller_status("garbage\r");
/// assert_eq!(status.monitor, "Err");
/// ```
pub fn parse_controller_status(raw: &str) -> ControllerStatus {
    let mut status = ControllerStatus::failed();

    for segment in strip_preamble(raw).split("  ") {
        let Some((label, value)) = segment.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        if !is_clean_value(value) {
            continue;
        }
        let field = match label.trim() {
            "C" => &mut status.command,
            "S" => &mut status.monitor,
            "E" => &mut status.exhaust,
            _ => continue,
        };
        *field = value.to_string();
    }

    status
}

/// Parse an external sensor status reply.
///
/// Fields are positional. A segment that swallowed its neighbour (a lost
/// ` | `) still advances the position once per `::` it contains, so only
/// the merged fields fall back to [`ERR`].
pub fn parse_sensor_status(raw: &str) -> SensorStatus {
    let mut status = SensorStatus::failed();
    let mut index = 0;

    for segment in strip_preamble(raw).split(" | ") {
        let labels = segment.matches("::").count();
        if labels == 1 {
            if let (Some(slot), Some((_, value))) = (status.slot(index), segment.split_once("::")) {
                let value = value.trim();
                if is_clean_value(value) {
                    *slot = value.to_string();
                }
            }
        }
        index += labels.max(1);
    }

    status
}

/// Whether a `?STAT` reply came from an external sensor board.
pub fn is_sensor_status(raw: &str) -> bool {
    raw.contains(SENSOR_STATUS_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_status_all_fields() {
        let status = parse_controller_status("STAT: C:1.0  S:2.0  E:3.0\r");
        assert_eq!(
            status,
            ControllerStatus {
                command: "1.0".into(),
                monitor: "2.0".into(),
                exhaust: "3.0".into(),
            }
        );
    }

    #[test]
    fn controller_status_bare_colon_preamble() {
        let status = parse_controller_status(": C:-0.25  S:99.5  E:0\r");
        assert_eq!(status.command, "-0.25");
        assert_eq!(status.monitor, "99.5");
        assert_eq!(status.exhaust, "0");
    }

    #[test]
    fn controller_status_garbage() {
        assert_eq!(parse_controller_status("garbage\r"), ControllerStatus::failed());
        assert_eq!(parse_controller_status(""), ControllerStatus::failed());
    }

    #[test]
    fn controller_status_missing_delimiter_affects_neighbours_only() {
        let status = parse_controller_status(": C:1.0 S:2.0  E:3.0\r");
        assert_eq!(status.command, ERR);
        assert_eq!(status.monitor, ERR);
        assert_eq!(status.exhaust, "3.0");
    }

    #[test]
    fn controller_status_missing_field() {
        let status = parse_controller_status(": C:1.0  E:3.0\r");
        assert_eq!(status.command, "1.0");
        assert_eq!(status.monitor, ERR);
        assert_eq!(status.exhaust, "3.0");
    }

    #[test]
    fn controller_status_empty_value() {
        let status = parse_controller_status(": C:  S:2.0  E:3.0\r");
        assert_eq!(status.command, ERR);
        assert_eq!(status.monitor, "2.0");
    }

    #[test]
    fn sensor_status_all_fields() {
        let status = parse_sensor_status("ADC::1.234 | SL::0.0 | SH::5.0 | OL::0.5 | OH::4.5\r");
        assert_eq!(
            status,
            SensorStatus {
                output: "1.234".into(),
                sensor_low: "0.0".into(),
                sensor_high: "5.0".into(),
                out_low: "0.5".into(),
                out_high: "4.5".into(),
            }
        );
    }

    #[test]
    fn sensor_status_missing_delimiter() {
        let status = parse_sensor_status("ADC::1.234 | SL::0.0 SH::5.0 | OL::0.5 | OH::4.5\r");
        assert_eq!(status.output, "1.234");
        assert_eq!(status.sensor_low, ERR);
        assert_eq!(status.sensor_high, ERR);
        assert_eq!(status.out_low, "0.5");
        assert_eq!(status.out_high, "4.5");
    }

    #[test]
    fn sensor_status_truncated() {
        let status = parse_sensor_status("ADC::1.234 | SL::0.0\r");
        assert_eq!(status.output, "1.234");
        assert_eq!(status.sensor_low, "0.0");
        assert_eq!(status.sensor_high, ERR);
        assert_eq!(status.out_high, ERR);
    }

    #[test]
    fn sensor_status_garbage() {
        assert_eq!(parse_sensor_status("garbage"), SensorStatus::failed());
    }

    #[test]
    fn sensor_marker() {
        assert!(is_sensor_status("STAT: ADC::1.0 | SL::0"));
        assert!(!is_sensor_status(": C:1.0  S:2.0  E:3.0"));
    }
}
