//! SureFlow framing and reply parsers.
//!
//! Commands are wrapped in carriage returns (`\rA\r`). The flow reply is a
//! space-separated record led by the unit id:
//!
//! ```text
//! A +014.70 +022.1 +012.34 +011.98
//!   pressure temp   ccm     sccm
//! ```

use instrlib_core::helpers::format_number;
use instrlib_core::types::Terminator;
use instrlib_text_io::protocol::encode_wrapped;

/// Line terminator.
pub const TERMINATOR: Terminator = Terminator::Cr;

/// Frame `command` for transmission.
///
/// # Example
///
/// ```
/// use instrlib_sureflow::protocol::frame;
///
/// assert_eq!(frame("A r76"), b"\rA r76\r");
/// ```
pub fn frame(command: &str) -> Vec<u8> {
    encode_wrapped(command, TERMINATOR)
}

/// One decoded flow record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// Line pressure.
    pub pressure: String,
    /// Gas temperature.
    pub temperature: String,
    /// Volumetric flow.
    pub ccm: String,
    /// Mass flow.
    pub sccm: String,
}

/// Decode a flow reply. Every field must be numeric.
pub fn parse_flow_record(reply: &str) -> Option<FlowRecord> {
    let fields: Vec<&str> = reply.split(' ').collect();
    let number = |i: usize| -> Option<String> {
        fields
            .get(i)?
            .trim()
            .parse::<f64>()
            .ok()
            .map(format_number)
    };
    Some(FlowRecord {
        pressure: number(1)?,
        temperature: number(2)?,
        ccm: number(3)?,
        sccm: number(4)?,
    })
}

/// Decode the serial number from a register 76 reply (`A r76 = 12345`).
pub fn parse_serial_reply(reply: &str) -> Option<String> {
    let value = reply.split('=').nth(1)?.trim();
    value.parse::<u64>().ok().map(|n| n.to_string())
}
