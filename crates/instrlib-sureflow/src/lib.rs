//! SureFlow backend for instrlib.
//!
//! The SureFlow is a reference flow meter. It answers `*` and `A` with the
//! same flow record and keeps its serial number in register 76. It has no
//! identify command that reports a model.

pub mod builder;
pub mod commands;
pub mod protocol;
pub mod sureflow;

pub use builder::SureFlowBuilder;
pub use sureflow::{FlowSnapshot, SureFlow};

/// Model recorded in the facade's info.
pub const MODEL: &str = "SureFlow";
