//! Mock port opener and advisory lock for discovery tests.
//!
//! [`MockOpener`] maps port names to factories producing fresh
//! [`MockTransport`]s, so a discovery sweep can open the same port once per
//! instrument family. [`MockLock`] marks ports as held elsewhere and tracks
//! which guards are still alive.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use instrlib_core::error::{Error, Result};
use instrlib_core::lock::{LockGuard, PortLock};
use instrlib_core::transport::{PortOpener, Transport};
use instrlib_core::types::LinkSettings;

use crate::mock_serial::MockTransport;

type Factory = Arc<dyn Fn() -> MockTransport + Send + Sync>;

/// A [`PortOpener`] backed by mock transports.
#[derive(Clone, Default)]
pub struct MockOpener {
    ports: HashMap<String, Factory>,
    failing: HashSet<String>,
    opened: Arc<Mutex<Vec<(String, u32)>>>,
}

impl MockOpener {
    /// Create an opener with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `port`; every open builds a new transport with `factory`.
    pub fn add_port<F>(&mut self, port: &str, factory: F) -> &mut Self
    where
        F: Fn() -> MockTransport + Send + Sync + 'static,
    {
        self.ports.insert(port.to_string(), Arc::new(factory));
        self
    }

    /// Make opening `port` fail with a transport error.
    pub fn fail_port(&mut self, port: &str) -> &mut Self {
        self.failing.insert(port.to_string());
        self
    }

    /// Every successful or attempted open as `(port, baud_rate)`, oldest first.
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PortOpener for MockOpener {
    async fn open(&self, port: &str, link: &LinkSettings) -> Result<Box<dyn Transport>> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push((port.to_string(), link.baud_rate));
        }
        if self.failing.contains(port) {
            return Err(Error::Transport(format!("cannot open {port}")));
        }
        match self.ports.get(port) {
            Some(factory) => Ok(Box::new(factory())),
            None => Err(Error::Transport(format!("no such port {port}"))),
        }
    }
}

/// Guard payload that releases the port in the shared `held` set on drop.
struct HeldPort {
    port: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for HeldPort {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.port);
        }
    }
}

/// A [`PortLock`] that refuses ports marked busy and refuses a second lock
/// on a port whose guard is still alive.
#[derive(Clone, Default)]
pub struct MockLock {
    busy: HashSet<String>,
    held: Arc<Mutex<HashSet<String>>>,
}

impl MockLock {
    /// Create a lock with every port free.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend another process holds `port`.
    pub fn busy(&mut self, port: &str) -> &mut Self {
        self.busy.insert(port.to_string());
        self
    }

    /// Whether a guard for `port` is currently alive.
    pub fn is_held(&self, port: &str) -> bool {
        self.held.lock().map(|h| h.contains(port)).unwrap_or(false)
    }
}

impl PortLock for MockLock {
    fn try_lock(&self, port: &str) -> Result<LockGuard> {
        if self.busy.contains(port) {
            return Err(Error::LockUnavailable(format!("{port} is busy")));
        }
        let mut held = self
            .held
            .lock()
            .map_err(|_| Error::LockUnavailable(format!("{port} lock poisoned")))?;
        if !held.insert(port.to_string()) {
            return Err(Error::LockUnavailable(format!("{port} is already locked")));
        }
        let handle = HeldPort {
            port: port.to_string(),
            held: self.held.clone(),
        };
        Ok(LockGuard::new(port, Box::new(handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn link() -> LinkSettings {
        LinkSettings::new(57_600, Duration::from_millis(400))
    }

    #[tokio::test]
    async fn opener_builds_fresh_transport_per_open() {
        let mut opener = MockOpener::new();
        opener.add_port("/dev/ttyUSB0", || {
            let mut mock = MockTransport::responder();
            mock.reply(b"?ID\r", b"ID X\r");
            mock
        });

        let a = opener.open("/dev/ttyUSB0", &link()).await.unwrap();
        let b = opener.open("/dev/ttyUSB0", &link()).await.unwrap();
        assert!(a.is_connected());
        assert!(b.is_connected());
        assert_eq!(opener.opened().len(), 2);
    }

    #[tokio::test]
    async fn opener_unknown_and_failing_ports() {
        let mut opener = MockOpener::new();
        opener.add_port("/dev/ttyUSB1", MockTransport::new);
        opener.fail_port("/dev/ttyUSB1");

        assert!(matches!(
            opener.open("/dev/ttyUSB1", &link()).await,
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            opener.open("/dev/ttyUSB9", &link()).await,
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn lock_refuses_busy_and_double_lock() {
        let mut lock = MockLock::new();
        lock.busy("/dev/ttyUSB1");

        assert!(matches!(
            lock.try_lock("/dev/ttyUSB1"),
            Err(Error::LockUnavailable(_))
        ));

        let guard = lock.try_lock("/dev/ttyUSB0").unwrap();
        assert!(lock.is_held("/dev/ttyUSB0"));
        assert!(matches!(
            lock.try_lock("/dev/ttyUSB0"),
            Err(Error::LockUnavailable(_))
        ));

        drop(guard);
        assert!(!lock.is_held("/dev/ttyUSB0"));
        assert!(lock.try_lock("/dev/ttyUSB0").is_ok());
    }
}
