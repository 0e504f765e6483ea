//! Frame builders for flow controller commands that are not plain
//! telemetry reads or writes.

use crate::protocol::{format_command, format_set};

/// Keyword for the coded valve command.
pub const VALVE_KEYWORD: &str = "DVALVE";

/// One `DVALVE` code. The board acts on the code; it does not report the
/// resulting valve state, so the facade tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveCommand {
    EnableBoth,
    DisableBoth,
    EnableInlet,
    DisableInlet,
    EnableExhaust,
    DisableExhaust,
}

impl ValveCommand {
    /// Wire code.
    pub fn code(&self) -> u8 {
        match self {
            ValveCommand::EnableBoth => 0,
            ValveCommand::EnableInlet => 1,
            ValveCommand::DisableInlet => 2,
            ValveCommand::EnableExhaust => 3,
            ValveCommand::DisableExhaust => 4,
            ValveCommand::DisableBoth => 5,
        }
    }

    /// Apply this command to `(inlet, exhaust)` enable flags.
    pub fn apply(&self, inlet: &mut bool, exhaust: &mut bool) {
        match self {
            ValveCommand::EnableBoth => {
                *inlet = true;
                *exhaust = true;
            }
            ValveCommand::DisableBoth => {
                *inlet = false;
                *exhaust = false;
            }
            ValveCommand::EnableInlet => *inlet = true,
            ValveCommand::DisableInlet => *inlet = false,
            ValveCommand::EnableExhaust => *exhaust = true,
            ValveCommand::DisableExhaust => *exhaust = false,
        }
    }
}

/// `DVALVE: <code>\r`
pub fn cmd_valve(command: ValveCommand) -> Vec<u8> {
    format_set(VALVE_KEYWORD, &command.code().to_string())
}

/// `SAVE\r`: persist settings to board flash.
pub fn cmd_save() -> Vec<u8> {
    format_command("SAVE")
}

/// `AUTOC\r`: run the board's auto-calibration.
pub fn cmd_auto_calibrate() -> Vec<u8> {
    format_command("AUTOC")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valve_codes() {
        assert_eq!(cmd_valve(ValveCommand::EnableBoth), b"DVALVE: 0\r");
        assert_eq!(cmd_valve(ValveCommand::EnableInlet), b"DVALVE: 1\r");
        assert_eq!(cmd_valve(ValveCommand::DisableInlet), b"DVALVE: 2\r");
        assert_eq!(cmd_valve(ValveCommand::EnableExhaust), b"DVALVE: 3\r");
        assert_eq!(cmd_valve(ValveCommand::DisableExhaust), b"DVALVE: 4\r");
        assert_eq!(cmd_valve(ValveCommand::DisableBoth), b"DVALVE: 5\r");
    }

    #[test]
    fn valve_flags() {
        let (mut inlet, mut exhaust) = (true, true);
        ValveCommand::DisableInlet.apply(&mut inlet, &mut exhaust);
        assert_eq!((inlet, exhaust), (false, true));
        ValveCommand::DisableBoth.apply(&mut inlet, &mut exhaust);
        assert_eq!((inlet, exhaust), (false, false));
        ValveCommand::EnableExhaust.apply(&mut inlet, &mut exhaust);
        assert_eq!((inlet, exhaust), (false, true));
        ValveCommand::EnableBoth.apply(&mut inlet, &mut exhaust);
        assert_eq!((inlet, exhaust), (true, true));
    }

    #[test]
    fn bare_commands() {
        assert_eq!(cmd_save(), b"SAVE\r");
        assert_eq!(cmd_auto_calibrate(), b"AUTOC\r");
    }
}
