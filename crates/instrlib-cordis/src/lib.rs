//! Cordis flow controller and external sensor backend for instrlib.
//!
//! Cordis boards speak a `\r`-terminated ASCII protocol: `?KW` queries and
//! `KW: value` sets. This crate provides:
//!
//! - **Protocol codec** ([`protocol`]) -- query/set frame encoding, reply
//!   decoding, and set-echo judging.
//! - **Status parsers** ([`status`]) -- the controller's three-field and the
//!   sensor's five-field status replies.
//! - **Model tables** ([`models`]) -- telemetry keywords and the CS-5090
//!   quirks, keyed by [`ControllerVariant`].
//! - **Command builders** ([`commands`]) -- `DVALVE`, `SAVE`, `AUTOC`.
//! - **Facades** ([`controller`], [`sensor`]) -- typed get/set over a
//!   [`Channel`](instrlib_text_io::Channel), snapshots, valves, leak test.
//! - **Builders** ([`builder`]) -- fluent construction with smart defaults.
//! - **Probe support** ([`probe`]) -- controller vs sensor during discovery.
//!
//! # Example
//!
//! ```
//! use instrlib_cordis::protocol::{format_set, parse_set_echo};
//! use instrlib_cordis::status::parse_controller_status;
//!
//! assert_eq!(format_set("CZERO", "10"), b"CZERO: 10\r");
//! assert!(parse_set_echo("CZERO: 10").accepted("CZERO"));
//!
//! let status = parse_controller_status(": C:1.0  S:2.0  E:3.0");
//! assert_eq!(status.monitor, "2.0");
//! ```

pub mod builder;
pub mod commands;
pub mod controller;
mod exchange;
pub mod models;
pub mod probe;
pub mod protocol;
pub mod sensor;
pub mod status;

// Re-export the primary types for ergonomic `use instrlib_cordis::*`.
pub use builder::{CordisBuilder, SensorBuilder};
pub use controller::{CordisController, ControllerSnapshot, LeakTestConfig, LeakTestReport};
pub use exchange::SetOutcome;
pub use models::{ControllerVariant, ParseTelemetryError, Telemetry};
pub use sensor::{ExternalSensor, SensorSnapshot, SensorTelemetry};
pub use status::{ControllerStatus, SensorStatus};
