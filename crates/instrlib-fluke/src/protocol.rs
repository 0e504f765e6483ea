//! Fluke SCPI-style framing and reply parsers.
//!
//! Both Fluke instruments take a command wrapped in carriage returns
//! (`\rMEAS:VOLT:DC?\r`) and answer with one `\r`-terminated line. The
//! leading `\r` flushes any partial command left in the instrument's input
//! parser.

use instrlib_core::helpers::{format_number, scale_number};
use instrlib_core::types::{Terminator, ERR};
use instrlib_text_io::protocol::encode_wrapped;

/// Line terminator used by both instruments.
pub const TERMINATOR: Terminator = Terminator::Cr;

/// Frame `command` for transmission.
///
/// # Example
///
/// ```
/// use instrlib_fluke::protocol::frame;
///
/// assert_eq!(frame("SYST:REM"), b"\rSYST:REM\r");
/// ```
pub fn frame(command: &str) -> Vec<u8> {
    encode_wrapped(command, TERMINATOR)
}

/// Pull the model and serial number out of an `*idn?` reply
/// (`FLUKE,8846A,1234567,08/02/10-11:53`).
pub fn parse_idn(reply: &str) -> Option<(String, String)> {
    let mut fields = reply.split(',').map(str::trim);
    let _maker = fields.next()?;
    let model = fields.next()?;
    let serial = fields.next()?;
    if model.is_empty() || serial.is_empty() {
        return None;
    }
    Some((model.to_string(), serial.to_string()))
}

/// Decode the measurement unit from a `CONF?` reply (`"VOLT +1.0E+01,..."`).
///
/// `VOLT` maps to `V` and `CURR` to `mA`, since current readings are
/// rescaled to milliamps. Anything unrecognised is returned as sent.
pub fn parse_conf_unit(reply: &str) -> String {
    let token = reply.split(' ').next().unwrap_or_default();
    let unit = token.get(1..).unwrap_or_default().trim().replace('"', "");
    if unit.is_empty() {
        return ERR.to_string();
    }
    unit.replace("VOLT", "V").replace("CURR", "mA")
}

/// Rescale a reading for `unit`: amps become milliamps, anything else is
/// passed through trimmed. Non-numeric current readings become [`ERR`].
pub fn scale_for_unit(raw: &str, unit: &str) -> String {
    if unit.contains("mA") {
        scale_number(raw, 1000.0).unwrap_or_else(|| ERR.to_string())
    } else {
        raw.trim().to_string()
    }
}

/// Split a 2700G `val?` reply (`14.6959,PSI`) into pressure and unit.
pub fn parse_pressure_reply(reply: &str) -> Option<(String, String)> {
    let (value, unit) = reply.split_once(',')?;
    let value: f64 = value.trim().parse().ok()?;
    let unit = unit.split(',').next().unwrap_or_default().trim();
    Some((format_number(value), unit.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_wrapped() {
        assert_eq!(frame("*idn?"), b"\r*idn?\r");
        assert_eq!(frame("FETCH3?"), b"\rFETCH3?\r");
    }

    #[test]
    fn idn_fields() {
        assert_eq!(
            parse_idn("FLUKE,8846A,1234567,08/02/10-11:53"),
            Some(("8846A".into(), "1234567".into()))
        );
        assert_eq!(
            parse_idn("FLUKE,2700G,9876543"),
            Some(("2700G".into(), "9876543".into()))
        );
        assert_eq!(parse_idn("FLUKE,8846A"), None);
        assert_eq!(parse_idn(""), None);
    }

    #[test]
    fn conf_units() {
        assert_eq!(parse_conf_unit("\"VOLT +1.00000000E+01,+3.00000000E-06\""), "V");
        assert_eq!(parse_conf_unit("\"CURR +1.00000000E-01,+1.00000000E-07\""), "mA");
        assert_eq!(parse_conf_unit("\"RES +1.0E+03\""), "RES");
        assert_eq!(parse_conf_unit(""), ERR);
    }

    #[test]
    fn scaling() {
        assert_eq!(scale_for_unit("0.0125", "mA"), "12.5");
        assert_eq!(scale_for_unit(" 1.234E+00 ", "V"), "1.234E+00");
        assert_eq!(scale_for_unit("OVLD", "mA"), ERR);
    }

    #[test]
    fn pressure_reply() {
        assert_eq!(
            parse_pressure_reply("14.6959,PSI"),
            Some(("14.6959".into(), "PSI".into()))
        );
        assert_eq!(
            parse_pressure_reply("15,kPa "),
            Some(("15.0".into(), "kPa".into()))
        );
        assert_eq!(parse_pressure_reply("14.6959"), None);
        assert_eq!(parse_pressure_reply("ERR,PSI"), None);
    }
}
