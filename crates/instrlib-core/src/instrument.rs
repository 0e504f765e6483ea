//! The `Instrument` trait -- common interface for all device facades.
//!
//! Bench applications poll whatever the discovery sweep found through
//! `dyn Instrument` without knowing which driver crate built it. Anything
//! family-specific (setpoints, valves, range switching) lives on the
//! concrete facade types.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{InstrumentInfo, Reading};

/// Unified asynchronous interface for a connected instrument.
///
/// Identity and connection state are synchronous. Reading the snapshot is
/// `async` because it waits for any operation holding the facade.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Identity captured when the facade was built.
    fn info(&self) -> &InstrumentInfo;

    /// Whether the underlying channel is still usable.
    ///
    /// Becomes `false` permanently after a write failure.
    fn is_connected(&self) -> bool;

    /// Poll the device's live values into the facade's snapshot.
    ///
    /// Individual field failures are recorded as sentinels in the snapshot;
    /// only a broken channel is reported as an error.
    async fn update_values(&self) -> Result<()>;

    /// The primary reading from the most recent poll.
    async fn reading(&self) -> Reading;
}
