//! Fluke command strings.

/// Identify.
pub const IDN: &str = "*idn?";

/// Switch the 8846A to remote control.
pub const REMOTE: &str = "SYST:REM";
/// Return the 8846A to front-panel control.
pub const LOCAL: &str = "SYST:LOC";

/// Measure DC volts.
pub const MEAS_VOLT_DC: &str = "MEAS:VOLT:DC?";
/// Measure DC amps.
pub const MEAS_CURR_DC: &str = "MEAS:CURR:DC?";
/// Configure the DC volts function.
pub const CONF_VOLT_DC: &str = "CONF:VOLT:DC";
/// Configure the DC amps function.
pub const CONF_CURR_DC: &str = "CONF:CURR:DC";
/// Query the configured function.
pub const CONF_QUERY: &str = "CONF?";
/// Fetch the latest reading.
pub const FETCH: &str = "FETCH3?";

/// Read pressure and unit from the 2700G.
pub const VALUE: &str = "val?";
