//! # Random Source
//!
//! Purpose: inject the source of randomness used for TTL jitter so it can
//! be swapped for a deterministic double in tests, matching the way
//! [`monstra_core::TimeSource`] is injected for the same reason.

/// A pure source of uniform randomness in `[0.0, 1.0)`.
pub trait RandomSource: Send + Sync {
    fn uniform(&self) -> f64;
}

/// Default random source backed by the thread-local RNG.
#[derive(Debug, Default)]
pub struct ThreadRandomSource;

impl RandomSource for ThreadRandomSource {
    fn uniform(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// A fixed-output random source for deterministic jitter tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandomSource(pub f64);

impl RandomSource for FixedRandomSource {
    fn uniform(&self) -> f64 {
        self.0
    }
}
