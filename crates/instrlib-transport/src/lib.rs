//! Transport implementations for instrlib.
//!
//! This crate provides the concrete pieces of the serial stack defined in
//! `instrlib-core`:
//!
//! - [`SerialTransport`]: USB virtual COM ports and RS-232 serial connections
//! - [`SerialOpener`]: the [`PortOpener`](instrlib_core::PortOpener) used by
//!   discovery and the builders
//! - [`FileLock`] / [`NoopLock`]: advisory port locks, chosen per platform by
//!   [`platform_lock()`]
//!
//! # Example
//!
//! ```no_run
//! use instrlib_core::PortLock;
//! use instrlib_transport::{platform_lock, SerialTransport};
//!
//! # async fn example() -> instrlib_core::Result<()> {
//! let _guard = platform_lock().try_lock("/dev/ttyUSB0")?;
//! let transport = SerialTransport::open("/dev/ttyUSB0", 57600).await?;
//! # Ok(())
//! # }
//! ```

pub mod lock;
pub mod serial;

pub use lock::{platform_lock, FileLock, NoopLock};
pub use serial::{available_ports, SerialOpener, SerialTransport};
