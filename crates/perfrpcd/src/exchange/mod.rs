//! Binary buffer exchange used to measure raw transfer cost.
//!
//! Buffers travel over the request/response channel as text at six bits per
//! character (see [`codec`]). The [`Performance`] operations work on raw bytes
//! and report how long their unit of work took; the measured duration is part
//! of every response payload.

mod channel;
pub mod codec;

pub use channel::{BinaryExchangeChannel, Performance, Timed, saturating_micros};
pub use codec::{CodecError, ExchangeBuffer};

/// Tracing target for exchange operations.
pub(crate) const EXCHANGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::exchange");
