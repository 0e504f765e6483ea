//! # instrlib -- serial laboratory instrument control
//!
//! `instrlib` is an asynchronous Rust library for the instruments on a
//! flow/pressure test bench: Cordis flow controllers and external sensor
//! boards, a Fluke 8846A multimeter, Fluke 2700G and GE Druck PACE1000
//! pressure standards, and a SureFlow flow standard. All of them speak
//! short ASCII request/response exchanges over point-to-point serial
//! links.
//!
//! ## Quick Start
//!
//! Find everything plugged in and take a reading from each device:
//!
//! ```no_run
//! use instrlib::discovery::Prober;
//!
//! #[tokio::main]
//! async fn main() {
//!     let devices = Prober::serial().discover(&instrlib::available_ports()).await;
//!     for device in &devices {
//!         if device.update_values().await.is_ok() {
//!             println!("{}: {}", device.info().kind, device.reading().await);
//!         }
//!     }
//! }
//! ```
//!
//! Or connect to a known port directly:
//!
//! ```no_run
//! use instrlib::cordis::{CordisBuilder, Telemetry};
//!
//! # async fn example() -> instrlib::Result<()> {
//! let controller = CordisBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .build()
//!     .await?;
//! let cfs = controller.get_telemetry(Telemetry::CommandFullScale).await;
//! println!("command full scale: {cfs}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                             |
//! |-------------------------|-----------------------------------------------------|
//! | `instrlib-core`         | [`Instrument`] trait, types, errors, identify table |
//! | `instrlib-transport`    | Serial transport and advisory port locks            |
//! | `instrlib-text-io`      | Line framing and the single-owner channel actor     |
//! | `instrlib-cordis`       | Flow controller and external sensor driver          |
//! | `instrlib-fluke`        | Fluke 8846A and 2700G drivers                       |
//! | `instrlib-druck`        | GE Druck PACE1000 driver                            |
//! | `instrlib-sureflow`     | SureFlow driver                                     |
//! | **`instrlib`**          | This facade crate, plus [`discovery`]               |
//!
//! Every facade implements [`Instrument`], so a polling loop can work with
//! `dyn Instrument` and stay family-agnostic.
//!
//! ## Feature Flags
//!
//! | Feature    | Enables                  | Default |
//! |------------|--------------------------|---------|
//! | `cordis`   | [`cordis`] module        | yes     |
//! | `fluke`    | [`fluke`] module         | yes     |
//! | `druck`    | [`druck`] module         | yes     |
//! | `sureflow` | [`sureflow`] module      | yes     |
//!
//! Discovery still classifies families whose driver is disabled, but
//! [`discovery::connect`] refuses them.

pub use instrlib_core::*;
pub use instrlib_transport::available_ports;

pub mod discovery;

/// Cordis flow controller and external sensor backend.
///
/// Provides [`CordisController`](cordis::CordisController),
/// [`ExternalSensor`](cordis::ExternalSensor) and their builders, the
/// keyword tables for the standard and CS-5090 variants, and the leak
/// test.
#[cfg(feature = "cordis")]
pub mod cordis {
    pub use instrlib_cordis::*;
}

/// Fluke 8846A multimeter and 2700G pressure gauge backend.
#[cfg(feature = "fluke")]
pub mod fluke {
    pub use instrlib_fluke::*;
}

/// GE Druck PACE1000 pressure standard backend.
#[cfg(feature = "druck")]
pub mod druck {
    pub use instrlib_druck::*;
}

/// SureFlow flow standard backend.
#[cfg(feature = "sureflow")]
pub mod sureflow {
    pub use instrlib_sureflow::*;
}

/// Every family whose driver is compiled in, in discovery priority order.
pub fn supported_families() -> Vec<InstrumentFamily> {
    InstrumentFamily::ALL
        .into_iter()
        .filter(|family| match family {
            InstrumentFamily::Cordis => cfg!(feature = "cordis"),
            InstrumentFamily::Fluke8846 | InstrumentFamily::Fluke2700 => cfg!(feature = "fluke"),
            InstrumentFamily::Pace1000 => cfg!(feature = "druck"),
            InstrumentFamily::SureFlow => cfg!(feature = "sureflow"),
        })
        .collect()
}
