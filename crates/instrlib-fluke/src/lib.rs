//! Fluke instrument backend for instrlib.
//!
//! Two Fluke instruments share one framing (commands wrapped in `\r`,
//! replies terminated by `\r`):
//!
//! - **Fluke 8846A** ([`fluke8846`]) -- 6.5 digit multimeter, DC volts and
//!   DC current (reported in milliamps), remote/local bracketing.
//! - **Fluke 2700G** ([`fluke2700`]) -- reference pressure gauge,
//!   `pressure,unit` readings.
//!
//! Plus the [`protocol`] framing and parsers, [`commands`] strings, and
//! fluent [`builder`]s.

pub mod builder;
pub mod commands;
pub mod fluke2700;
pub mod fluke8846;
pub mod protocol;

pub use builder::{Fluke2700Builder, Fluke8846Builder, FlukeBuilder};
pub use fluke2700::{Fluke2700, PressureSnapshot};
pub use fluke8846::{Fluke8846, MeterSnapshot};
