//! # monstra-cache
//!
//! A bounded, TTL-aware, priority-aware cache built on
//! [`monstra_core::TtlPriorityLruMap`]. See [`CacheEngine`] for the public
//! surface and [`CacheConfig`] for the knobs that shape it.

pub mod config;
pub mod engine;
pub mod random;
pub mod stats;

pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_ENTRY_COST};
pub use engine::{CacheEngine, CacheValue, GetResult};
pub use random::{FixedRandomSource, RandomSource, ThreadRandomSource};
pub use stats::{AccessRecord, Statistics};
