//! Advisory port locks.
//!
//! [`FileLock`] takes a non-blocking exclusive `flock` on the device node so
//! two processes never drive the same instrument. [`NoopLock`] stands in on
//! platforms without advisory locks and always succeeds.
//!
//! The lock lives on its own descriptor, opened before the serial stream
//! exists and held by the [`LockGuard`] for the channel's lifetime. That
//! descriptor is never read or written. It is opened with `O_NOCTTY` so the
//! port cannot become the process's controlling terminal, and with
//! `O_NONBLOCK` so the open does not wait for carrier detect.

use fs2::FileExt;
use instrlib_core::error::{Error, Result};
use instrlib_core::lock::{LockGuard, PortLock};
use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Arc;

fn open_lock_handle(port: &str) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK);
    }
    options.open(port)
}

/// Exclusive advisory lock on the port's device file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLock;

impl PortLock for FileLock {
    fn try_lock(&self, port: &str) -> Result<LockGuard> {
        let file = open_lock_handle(port).map_err(|e| {
            tracing::debug!(port = %port, error = %e, "Cannot open port for locking");
            Error::LockUnavailable(format!("{port}: {e}"))
        })?;

        file.try_lock_exclusive().map_err(|e| {
            tracing::debug!(port = %port, error = %e, "Port is locked elsewhere");
            Error::LockUnavailable(format!("{port}: {e}"))
        })?;

        tracing::trace!(port = %port, "Acquired advisory lock");
        // The flock is released when the file is closed with the guard.
        Ok(LockGuard::new(port, Box::new(file)))
    }
}

/// Lock that always succeeds without holding anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

impl PortLock for NoopLock {
    fn try_lock(&self, port: &str) -> Result<LockGuard> {
        Ok(LockGuard::unlocked(port))
    }
}

/// The advisory lock for the current platform: [`FileLock`] on Unix,
/// [`NoopLock`] elsewhere.
pub fn platform_lock() -> Arc<dyn PortLock> {
    if cfg!(unix) {
        Arc::new(FileLock)
    } else {
        Arc::new(NoopLock)
    }
}
