//! # Time Source
//!
//! Purpose: give every other component a monotonic, injectable clock so TTL
//! and jitter logic can be driven by a virtual clock in tests instead of
//! real sleeps.
//!
//! ## Design Principles
//!
//! 1. **Injected, Never Ambient**: components take a `&dyn TimeSource`
//!    rather than reading `Instant::now()` directly.
//! 2. **Sentinel Infinity**: an infinite-TTL marker compares greater than
//!    every finite timestamp and absorbs arithmetic without panicking.
//! 3. **Cheap Arithmetic**: subtraction yields whole seconds as `f64` so
//!    callers can do TTL/jitter math without unit conversion boilerplate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A point in monotonic time, measured in nanoseconds since an arbitrary
/// origin. [`Timestamp::INFINITY`] is a sentinel that represents an
/// infinite-TTL expiration and never compares less than a finite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The origin of the clock. Not meaningful on its own; useful as a
    /// baseline for tests that only care about relative offsets.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Sentinel for "never expires". Arithmetic with this value saturates
    /// back to itself rather than wrapping.
    pub const INFINITY: Timestamp = Timestamp(u64::MAX);

    /// True when this timestamp is the infinite sentinel.
    pub fn is_infinite(self) -> bool {
        self == Timestamp::INFINITY
    }

    /// Seconds elapsed from `earlier` to `self`. Returns `f64::INFINITY`
    /// when either endpoint is the infinite sentinel (and the result would
    /// otherwise be unbounded), and `f64::NEG_INFINITY` in the symmetric
    /// case of measuring from an infinite timestamp to a finite one.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        match (self.is_infinite(), earlier.is_infinite()) {
            (true, true) => 0.0,
            (true, false) => f64::INFINITY,
            (false, true) => f64::NEG_INFINITY,
            (false, false) => {
                let delta_nanos = self.0 as i128 - earlier.0 as i128;
                delta_nanos as f64 / 1_000_000_000.0
            }
        }
    }

    /// Adds a (possibly negative) offset in seconds. Infinity plus anything
    /// is still infinity; the result saturates at the representable range
    /// rather than overflowing.
    pub fn add_secs(self, secs: f64) -> Timestamp {
        if self.is_infinite() || secs.is_infinite() {
            return Timestamp::INFINITY;
        }
        let delta_nanos = secs * 1_000_000_000.0;
        let new_nanos = self.0 as i128 + delta_nanos as i128;
        Timestamp(new_nanos.clamp(0, (u64::MAX - 1) as i128) as u64)
    }

    /// Raw nanosecond value, primarily for test assertions.
    pub fn as_nanos(self) -> u64 {
        self.0
    }
}

/// Monotonic, high-resolution timestamp source with at least microsecond
/// resolution. Every other component consumes time only through this
/// interface so tests can inject a virtual clock instead of sleeping.
pub trait TimeSource: Send + Sync {
    /// The current timestamp. Must be non-decreasing across calls from any
    /// thread.
    fn now(&self) -> Timestamp;
}

/// Real wall-clock time source backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        SystemTimeSource {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        SystemTimeSource::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_nanos() as u64)
    }
}

/// A virtual clock for tests: starts at [`Timestamp::ZERO`] and only moves
/// when explicitly advanced, so TTL and jitter tests never need to sleep.
#[derive(Debug)]
pub struct ManualTimeSource {
    nanos: AtomicU64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        ManualTimeSource {
            nanos: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance(&self, secs: f64) {
        let delta = (secs * 1_000_000_000.0).max(0.0) as u64;
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute offset from the origin, in seconds.
    pub fn set(&self, secs: f64) {
        let nanos = (secs * 1_000_000_000.0).max(0.0) as u64;
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinity_absorbs_arithmetic() {
        assert!(Timestamp::INFINITY.add_secs(5.0).is_infinite());
        assert!(Timestamp::INFINITY.add_secs(f64::INFINITY).is_infinite());
    }

    #[test]
    fn seconds_since_is_symmetric_around_zero() {
        let t0 = Timestamp::ZERO;
        let t1 = t0.add_secs(1.5);
        assert!((t1.seconds_since(t0) - 1.5).abs() < 1e-9);
        assert!((t0.seconds_since(t1) + 1.5).abs() < 1e-9);
    }

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualTimeSource::new();
        let t0 = clock.now();
        let t1 = clock.now();
        assert_eq!(t0, t1);
        clock.advance(2.0);
        let t2 = clock.now();
        assert!((t2.seconds_since(t0) - 2.0).abs() < 1e-6);
    }
}
