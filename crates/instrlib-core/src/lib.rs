//! instrlib-core: Core traits, types, and error definitions for instrlib.
//!
//! This crate defines the instrument-agnostic abstractions that every
//! instrlib backend builds on. Bench applications depend on these types
//! without pulling in any specific instrument driver.
//!
//! # Key types
//!
//! - [`Instrument`] -- the common trait every device facade implements
//! - [`Transport`] -- byte-level communication channel
//! - [`PortOpener`] -- opens transports for discovery
//! - [`PortLock`] -- advisory exclusive lock capability
//! - [`IdentifyProfile`] -- identify frame and signature per family
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod helpers;
pub mod identify;
pub mod instrument;
pub mod lock;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use instrlib_core::*`.
pub use error::{Error, Result};
pub use helpers::{error_marker, format_number, is_error_marker, scale_number};
pub use identify::{IdentifyProfile, classify_response, profile};
pub use instrument::Instrument;
pub use lock::{LockGuard, PortLock};
pub use transport::{PortOpener, Transport};
pub use types::*;
