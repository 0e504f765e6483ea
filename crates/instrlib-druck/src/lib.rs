//! GE Druck PACE1000 backend for instrlib.
//!
//! The PACE1000 is a reference pressure standard speaking SCPI over
//! CR+LF-terminated lines at 57600 baud. Replies are slow, so the default
//! exchange timeout is 4 seconds.

pub mod builder;
pub mod commands;
pub mod pace1000;
pub mod protocol;

pub use builder::Pace1000Builder;
pub use pace1000::{Pace1000, PaceSnapshot};
