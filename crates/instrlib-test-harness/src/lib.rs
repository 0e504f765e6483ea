//! instrlib-test-harness: Test utilities and mock transports for instrlib.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! instrument drivers without real hardware, plus [`MockOpener`] and
//! [`MockLock`] for exercising the discovery sweep.

pub mod mock_port;
pub mod mock_serial;

pub use mock_port::{MockLock, MockOpener};
pub use mock_serial::{MockEvent, MockLog, MockTransport};
