//! Advisory port locking.
//!
//! Exclusivity between processes is advisory: a [`PortLock`] either grants
//! a [`LockGuard`] immediately or fails with
//! [`Error::LockUnavailable`](crate::error::Error::LockUnavailable). It never
//! blocks. The lock is released when the guard is dropped.

use std::any::Any;
use std::fmt;

use crate::error::Result;

/// Capability to take a non-blocking exclusive lock on a port.
pub trait PortLock: Send + Sync {
    /// Try to lock `port` exclusively, failing immediately if it is held.
    fn try_lock(&self, port: &str) -> Result<LockGuard>;
}

/// Holds an advisory lock until dropped.
pub struct LockGuard {
    port: String,
    _handle: Box<dyn Any + Send + Sync>,
}

impl LockGuard {
    /// Wrap a backend-specific handle whose drop releases the lock.
    pub fn new(port: impl Into<String>, handle: Box<dyn Any + Send + Sync>) -> Self {
        LockGuard {
            port: port.into(),
            _handle: handle,
        }
    }

    /// A guard that holds nothing, for platforms without advisory locks.
    pub fn unlocked(port: impl Into<String>) -> Self {
        LockGuard::new(port, Box::new(()))
    }

    /// The port this guard covers.
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("port", &self.port).finish()
    }
}
