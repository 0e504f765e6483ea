//! PACE1000 command strings.

/// Identify.
pub const IDN: &str = "*idn?";
/// Read the measured pressure.
pub const PRESSURE: &str = ":SENS:PRES?";
/// Read the pressure unit.
pub const UNIT: &str = ":UNIT:PRES?";
