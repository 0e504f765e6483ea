//! Fluke2700: the Fluke 2700G reference pressure gauge facade.
//!
//! The gauge answers `val?` with `pressure,unit`. Pressure and unit come
//! from the same reply, so every read refreshes both.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use instrlib_core::error::{Error, Result};
use instrlib_core::instrument::Instrument;
use instrlib_core::types::{InstrumentInfo, Reading, ERR};
use instrlib_text_io::Channel;

use crate::commands;
use crate::protocol::{self, frame};

/// Last pressure reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PressureSnapshot {
    /// Pressure value, or [`ERR`].
    pub pressure: String,
    /// Pressure unit, or [`ERR`].
    pub unit: String,
}

/// A connected Fluke 2700G.
///
/// Constructed via [`Fluke2700Builder`](crate::builder::Fluke2700Builder).
pub struct Fluke2700 {
    channel: Channel,
    info: InstrumentInfo,
    snapshot: Mutex<PressureSnapshot>,
}

impl Fluke2700 {
    pub(crate) fn new(channel: Channel, info: InstrumentInfo) -> Self {
        Fluke2700 {
            channel,
            info,
            snapshot: Mutex::new(PressureSnapshot::default()),
        }
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> PressureSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Stop the channel.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Read the pressure. Returns [`ERR`] when the reply is unusable.
    pub async fn read_pressure(&self) -> String {
        self.poll().await.pressure
    }

    /// Read the pressure unit. Returns [`ERR`] when the reply is unusable.
    pub async fn read_unit(&self) -> String {
        self.poll().await.unit
    }

    async fn poll(&self) -> PressureSnapshot {
        let mut snap = self.snapshot.lock().await;
        *snap = match self.channel.exchange(frame(commands::VALUE)).await {
            Ok(reply) => match protocol::parse_pressure_reply(&reply) {
                Some((pressure, unit)) => PressureSnapshot { pressure, unit },
                None => {
                    debug!(port = %self.channel.port(), reply = %reply, "unusable val? reply");
                    PressureSnapshot {
                        pressure: ERR.into(),
                        unit: ERR.into(),
                    }
                }
            },
            Err(e) => {
                debug!(port = %self.channel.port(), error = %e, "val? failed");
                PressureSnapshot {
                    pressure: ERR.into(),
                    unit: ERR.into(),
                }
            }
        };
        snap.clone()
    }
}

#[async_trait]
impl Instrument for Fluke2700 {
    fn info(&self) -> &InstrumentInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    async fn update_values(&self) -> Result<()> {
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }
        self.poll().await;
        Ok(())
    }

    async fn reading(&self) -> Reading {
        let snap = self.snapshot.lock().await;
        Reading::new(snap.pressure.clone(), snap.unit.clone())
    }
}
