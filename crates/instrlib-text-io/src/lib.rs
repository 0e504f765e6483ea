//! Shared line framing and channel IO for every instrlib backend.
//!
//! This crate provides the single-IO-task pattern for the terminator-framed
//! ASCII protocols all supported instruments speak. One tokio task owns the
//! transport exclusively and handles every exchange, the prompt drain before
//! set commands, and shutdown.
//!
//! # Architecture
//!
//! - [`protocol`] -- decode/encode for `\r` and `\r\n` terminated lines
//! - [`channel`] -- the [`Channel`] handle, its IO task, and the exchange
//!   primitives the discovery sweep reuses

pub mod channel;
pub mod protocol;

pub use channel::{Channel, ChannelConfig};
