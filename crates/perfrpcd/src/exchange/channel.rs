//! Timed send/receive/exchange over raw byte buffers.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::trace;

use super::EXCHANGE_TARGET;

/// Result of a unit of work together with the time it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timed<T> {
    /// Produced value.
    pub value: T,
    /// Time spent inside the unit of work.
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    /// Elapsed time in whole microseconds, saturating at `u32::MAX`.
    #[must_use]
    pub fn micros(&self) -> u32 {
        saturating_micros(self.elapsed)
    }
}

/// Operations exposed to measure raw transfer cost.
///
/// Durations cover only the unit of work; encoding and decoding of textual
/// buffers happens outside these calls.
pub trait Performance: Send + Sync {
    /// Consumes an outbound buffer.
    fn send(&self, buffer: &[u8]) -> Duration;

    /// Produces up to `max_length` bytes of channel content.
    fn receive(&self, max_length: u16) -> Timed<Vec<u8>>;

    /// Consumes `buffer` and produces a reply of up to `max_reply_length`
    /// bytes in one unit of work.
    fn exchange(&self, buffer: &[u8], max_reply_length: u16) -> Timed<Vec<u8>>;
}

/// Converts a duration to microseconds, saturating at `u32::MAX`.
#[must_use]
pub fn saturating_micros(elapsed: Duration) -> u32 {
    u32::try_from(elapsed.as_micros()).unwrap_or(u32::MAX)
}

const FILL_PATTERN: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// In-process implementation of [`Performance`].
///
/// Sent bytes are folded into a checksum; replies echo the inbound bytes and
/// pad with a fixed pattern up to the requested length.
#[derive(Debug, Default)]
pub struct BinaryExchangeChannel {
    inbound: AtomicU64,
    outbound: AtomicU64,
}

impl BinaryExchangeChannel {
    /// Creates a channel with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes consumed by `send` and `exchange`.
    #[must_use]
    pub fn inbound_bytes(&self) -> u64 {
        self.inbound.load(Ordering::Relaxed)
    }

    /// Total bytes produced by `receive` and `exchange`.
    #[must_use]
    pub fn outbound_bytes(&self) -> u64 {
        self.outbound.load(Ordering::Relaxed)
    }

    fn consume(&self, buffer: &[u8]) {
        let digest = buffer
            .iter()
            .fold(0_u32, |acc, byte| acc.rotate_left(5) ^ u32::from(*byte));
        black_box(digest);
        self.inbound
            .fetch_add(buffer.len() as u64, Ordering::Relaxed);
    }

    fn produce(&self, seed: &[u8], length: u16) -> Vec<u8> {
        let reply: Vec<u8> = seed
            .iter()
            .chain(FILL_PATTERN.iter().cycle())
            .take(usize::from(length))
            .copied()
            .collect();
        self.outbound
            .fetch_add(reply.len() as u64, Ordering::Relaxed);
        reply
    }
}

impl Performance for BinaryExchangeChannel {
    fn send(&self, buffer: &[u8]) -> Duration {
        let measured = timed(|| self.consume(buffer));
        trace!(
            target: EXCHANGE_TARGET,
            bytes = buffer.len(),
            micros = measured.micros(),
            "send completed"
        );
        measured.elapsed
    }

    fn receive(&self, max_length: u16) -> Timed<Vec<u8>> {
        let measured = timed(|| self.produce(&[], max_length));
        trace!(
            target: EXCHANGE_TARGET,
            bytes = measured.value.len(),
            micros = measured.micros(),
            "receive completed"
        );
        measured
    }

    fn exchange(&self, buffer: &[u8], max_reply_length: u16) -> Timed<Vec<u8>> {
        let measured = timed(|| {
            self.consume(buffer);
            self.produce(buffer, max_reply_length)
        });
        trace!(
            target: EXCHANGE_TARGET,
            inbound = buffer.len(),
            outbound = measured.value.len(),
            micros = measured.micros(),
            "exchange completed"
        );
        measured
    }
}

fn timed<T>(work: impl FnOnce() -> T) -> Timed<T> {
    let started = Instant::now();
    let value = work();
    let elapsed = started.elapsed();
    Timed { value, elapsed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_fills_requested_length() {
        let channel = BinaryExchangeChannel::new();
        let received = channel.receive(70);
        assert_eq!(received.value.len(), 70);
        assert_eq!(received.value.get(..3), Some(&b"012"[..]));
        assert_eq!(channel.outbound_bytes(), 70);
    }

    #[test]
    fn exchange_echoes_then_pads() {
        let channel = BinaryExchangeChannel::new();
        let reply = channel.exchange(b"ping", 6);
        assert_eq!(reply.value, b"ping01");
        assert_eq!(channel.inbound_bytes(), 4);
    }

    #[test]
    fn exchange_truncates_to_reply_limit() {
        let channel = BinaryExchangeChannel::new();
        let reply = channel.exchange(b"longer payload", 4);
        assert_eq!(reply.value, b"long");
    }

    #[test]
    fn send_counts_inbound_bytes() {
        let channel = BinaryExchangeChannel::new();
        let _ = channel.send(&[1, 2, 3]);
        assert_eq!(channel.inbound_bytes(), 3);
        assert_eq!(channel.outbound_bytes(), 0);
    }

    #[test]
    fn micros_saturate() {
        assert_eq!(saturating_micros(Duration::from_secs(u64::MAX)), u32::MAX);
        assert_eq!(saturating_micros(Duration::from_micros(15)), 15);
    }
}
