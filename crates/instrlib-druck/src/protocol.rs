//! PACE1000 framing and reply parsers.
//!
//! The PACE1000 speaks SCPI over CR+LF lines. Commands are wrapped in the
//! terminator (`\r\n:SENS:PRES?\r\n`) and replies echo the command header
//! followed by a space and the value (`:SENS:PRES 14.6959`).

use instrlib_core::types::Terminator;
use instrlib_text_io::protocol::encode_wrapped;

/// Line terminator.
pub const TERMINATOR: Terminator = Terminator::CrLf;

/// Frame `command` for transmission.
///
/// # Example
///
/// ```
/// use instrlib_druck::protocol::frame;
///
/// assert_eq!(frame(":UNIT:PRES?"), b"\r\n:UNIT:PRES?\r\n");
/// ```
pub fn frame(command: &str) -> Vec<u8> {
    encode_wrapped(command, TERMINATOR)
}

/// Pull the model and serial number out of an identify reply
/// (`*IDN GE Druck,PACE1000,1234567,02.00.05`).
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

/// The value following the echoed header in a query reply.
///
/// Returns `None` when the reply has no second space-separated field.
pub fn parse_value_reply(reply: &str) -> Option<String> {
    let value = reply.split(' ').nth(1)?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}
