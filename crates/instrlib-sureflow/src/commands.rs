//! SureFlow command strings.

/// Poll the flow record.
pub const FLOW: &str = "A";
/// Read register 76 (serial number).
pub const SERIAL: &str = "A r76";
