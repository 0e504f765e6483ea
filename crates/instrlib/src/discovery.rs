//! Port discovery: which serial port holds which instrument.
//!
//! A [`Prober`] asks one candidate port "who are you?" at each family's
//! link settings, in [`InstrumentFamily::ALL`] priority order. Each attempt
//! takes the port's advisory lock without blocking, opens a transient
//! transport, exchanges the family's identify frame and classifies the
//! reply. A miss closes the transport and releases the lock before the
//! next attempt; a hit hands both to [`connect()`], which promotes them to
//! the long-lived channel of the matching facade.
//!
//! # Example
//!
//! ```no_run
//! use instrlib::discovery::{connect, Prober};
//!
//! # async fn example() {
//! let prober = Prober::serial();
//! let ports = instrlib::available_ports();
//! for hit in prober.sweep(&ports).await {
//!     match connect(hit).await {
//!         Ok(device) => println!("{} on {}", device.info().kind, device.info().port),
//!         Err(e) => eprintln!("connect failed: {e}"),
//!     }
//! }
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use instrlib_core::error::{Error, Result};
use instrlib_core::identify::{classify_response, profile};
use instrlib_core::instrument::Instrument;
use instrlib_core::lock::{LockGuard, PortLock};
use instrlib_core::transport::{PortOpener, Transport};
use instrlib_core::types::{Classification, DeviceKind, InstrumentFamily};
use instrlib_text_io::channel::exchange_once;

/// The board's console UART. Never probed.
pub const CONSOLE_PORT: &str = "/dev/ttyAMA0";

/// A matched port: the classification plus the still-open transport and
/// the lock guard, ready to be promoted by [`connect()`].
pub struct ProbeHit {
    pub classification: Classification,
    pub transport: Box<dyn Transport>,
    pub lock: LockGuard,
}

impl std::fmt::Debug for ProbeHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeHit")
            .field("classification", &self.classification)
            .finish_non_exhaustive()
    }
}

/// Identifies instruments on candidate ports.
#[derive(Clone)]
pub struct Prober {
    opener: Arc<dyn PortOpener>,
    lock: Arc<dyn PortLock>,
    families: Vec<InstrumentFamily>,
}

impl Prober {
    /// A prober over `opener` and `lock`, trying every family.
    pub fn new(opener: Arc<dyn PortOpener>, lock: Arc<dyn PortLock>) -> Self {
        Prober {
            opener,
            lock,
            families: InstrumentFamily::ALL.to_vec(),
        }
    }

    /// A prober over real serial ports with the platform's advisory lock.
    pub fn serial() -> Self {
        Self::new(
            Arc::new(instrlib_transport::SerialOpener),
            instrlib_transport::platform_lock(),
        )
    }

    /// Restrict probing to `families`, tried in the given order.
    pub fn families(mut self, families: &[InstrumentFamily]) -> Self {
        self.families = families.to_vec();
        self
    }

    /// Try every configured family on `port`; the first match wins.
    ///
    /// Returns [`Error::LockUnavailable`] when another owner holds the
    /// port and [`Error::NotMatched`] when no family answered.
    pub async fn identify(&self, port: &str) -> Result<ProbeHit> {
        for &family in &self.families {
            match self.identify_as(port, family).await {
                Ok(hit) => return Ok(hit),
                Err(e @ Error::LockUnavailable(_)) => return Err(e),
                Err(_) => continue,
            }
        }
        Err(Error::NotMatched)
    }

    /// Probe `port` for one family only.
    ///
    /// Every failure other than a held lock is reported as
    /// [`Error::NotMatched`].
    pub async fn identify_as(&self, port: &str, family: InstrumentFamily) -> Result<ProbeHit> {
        if port == CONSOLE_PORT {
            return Err(Error::NotMatched);
        }
        let guard = self.lock.try_lock(port)?;
        let profile = profile(family);

        let mut transport = match self.opener.open(port, &profile.link).await {
            Ok(t) => t,
            Err(e) => {
                debug!(port, %family, error = %e, "open failed");
                return Err(Error::NotMatched);
            }
        };

        let reply = exchange_once(
            transport.as_mut(),
            profile.identify_frame,
            profile.terminator,
            profile.link.timeout,
        )
        .await;

        let response = match reply {
            Ok(response) if classify_response(&response) == Some(family) => response,
            Ok(response) => {
                debug!(port, %family, response = %response, "signature mismatch");
                close(transport.as_mut(), port).await;
                return Err(Error::NotMatched);
            }
            Err(e) => {
                debug!(port, %family, error = %e, "identify exchange failed");
                close(transport.as_mut(), port).await;
                return Err(Error::NotMatched);
            }
        };

        let kind = resolve_kind(family, transport.as_mut(), &response).await;
        info!(port, %family, %kind, "instrument identified");

        Ok(ProbeHit {
            classification: Classification {
                port: port.to_string(),
                family,
                kind,
                response,
            },
            transport,
            lock: guard,
        })
    }

    /// Identify every port in `ports`, skipping the console and any port
    /// that does not answer. At most one hit per port.
    pub async fn sweep(&self, ports: &[String]) -> Vec<ProbeHit> {
        let mut hits = Vec::new();
        for port in ports {
            if port == CONSOLE_PORT {
                debug!(port = %port, "skipping console port");
                continue;
            }
            match self.identify(port).await {
                Ok(hit) => hits.push(hit),
                Err(e) => debug!(port = %port, error = %e, "no instrument"),
            }
        }
        info!(candidates = ports.len(), found = hits.len(), "sweep complete");
        hits
    }

    /// Sweep `ports` and build a facade for every hit. Hits whose facade
    /// cannot be built are logged and dropped.
    pub async fn discover(&self, ports: &[String]) -> Vec<Box<dyn Instrument>> {
        let mut devices = Vec::new();
        for hit in self.sweep(ports).await {
            let port = hit.classification.port.clone();
            match connect(hit).await {
                Ok(device) => devices.push(device),
                Err(e) => debug!(port = %port, error = %e, "connect failed"),
            }
        }
        devices
    }
}

async fn close(transport: &mut dyn Transport, port: &str) {
    if let Err(e) = transport.close().await {
        debug!(port, error = %e, "close failed");
    }
}

#[cfg(feature = "cordis")]
async fn resolve_kind(
    family: InstrumentFamily,
    transport: &mut dyn Transport,
    response: &str,
) -> DeviceKind {
    match family {
        InstrumentFamily::Cordis => {
            instrlib_cordis::probe::resolve_kind(transport, response, profile(family).link.timeout)
                .await
        }
        _ => family.default_kind(),
    }
}

#[cfg(not(feature = "cordis"))]
async fn resolve_kind(
    family: InstrumentFamily,
    _transport: &mut dyn Transport,
    _response: &str,
) -> DeviceKind {
    family.default_kind()
}

/// Build the facade for a probe hit, reusing its transport and lock.
///
/// Returns [`Error::Unsupported`] when the driver for the hit's family is
/// not compiled in.
pub async fn connect(hit: ProbeHit) -> Result<Box<dyn Instrument>> {
    let ProbeHit {
        classification: c,
        transport,
        lock,
    } = hit;

    match (c.family, c.kind) {
        #[cfg(feature = "cordis")]
        (InstrumentFamily::Cordis, DeviceKind::ExternalSensor) => Ok(Box::new(
            instrlib_cordis::SensorBuilder::new()
                .build_from_probe(&c, transport, lock)
                .await?,
        )),
        #[cfg(feature = "cordis")]
        (InstrumentFamily::Cordis, _) => Ok(Box::new(
            instrlib_cordis::CordisBuilder::new()
                .build_from_probe(&c, transport, lock)
                .await?,
        )),
        #[cfg(feature = "fluke")]
        (InstrumentFamily::Fluke8846, _) => Ok(Box::new(
            instrlib_fluke::Fluke8846Builder::new()
                .build_from_probe(&c, transport, lock)
                .await?,
        )),
        #[cfg(feature = "fluke")]
        (InstrumentFamily::Fluke2700, _) => Ok(Box::new(
            instrlib_fluke::Fluke2700Builder::new()
                .build_from_probe(&c, transport, lock)
                .await?,
        )),
        #[cfg(feature = "druck")]
        (InstrumentFamily::Pace1000, _) => Ok(Box::new(
            instrlib_druck::Pace1000Builder::new()
                .build_from_probe(&c, transport, lock)
                .await?,
        )),
        #[cfg(feature = "sureflow")]
        (InstrumentFamily::SureFlow, _) => Ok(Box::new(
            instrlib_sureflow::SureFlowBuilder::new()
                .build_from_probe(&c, transport, lock)
                .await?,
        )),
        #[allow(unreachable_patterns)]
        (family, _) => {
            drop((transport, lock));
            Err(Error::Unsupported(format!("{family} driver not enabled")))
        }
    }
}
