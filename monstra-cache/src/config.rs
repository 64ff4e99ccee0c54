//! # Cache Configuration
//!
//! Purpose: the option table from which a [`crate::CacheEngine`] is built,
//! plus a builder so the seven-plus optional knobs don't force callers
//! through a field-for-field constructor.

use std::sync::Arc;

use monstra_core::TimeSource;

use crate::random::RandomSource;
use crate::stats::{AccessRecord, Statistics};

pub(crate) type KeyValidator<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;
pub(crate) type CostEstimator<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;
pub(crate) type StatsCallback = Arc<dyn Fn(&Statistics, AccessRecord) + Send + Sync>;

/// A fixed per-entry cost used when no [`CacheConfig::cost_estimator`] is
/// supplied.
pub const DEFAULT_ENTRY_COST: u64 = 64;

/// Resolved configuration for a [`crate::CacheEngine`]. Build with
/// [`CacheConfig::builder`]; negative capacities are normalized to `0` and a
/// `memory_budget` of `0` or less rejects every insert, per spec.
pub struct CacheConfig<K, V> {
    pub enable_thread_synchronization: bool,
    pub capacity: usize,
    pub memory_budget: Option<i64>,
    pub default_ttl: f64,
    pub default_ttl_for_null_entry: f64,
    pub ttl_jitter: f64,
    pub(crate) key_validator: KeyValidator<K>,
    pub(crate) cost_estimator: CostEstimator<V>,
    pub(crate) time_source: Arc<dyn TimeSource>,
    pub(crate) random_source: Arc<dyn RandomSource>,
    pub(crate) stats_callback: Option<StatsCallback>,
}

impl<K, V> CacheConfig<K, V>
where
    K: 'static,
    V: 'static,
{
    pub fn builder() -> CacheConfigBuilder<K, V> {
        CacheConfigBuilder::new()
    }
}

/// Builder for [`CacheConfig`]. Defaults: `capacity = 1024`, no memory
/// budget (unbounded), `default_ttl = infinity`,
/// `default_ttl_for_null_entry = infinity`, `ttl_jitter = 0`, a key
/// validator that accepts everything, and a cost estimator that charges
/// [`DEFAULT_ENTRY_COST`] per entry.
pub struct CacheConfigBuilder<K, V> {
    enable_thread_synchronization: bool,
    capacity: i64,
    memory_budget: Option<i64>,
    default_ttl: f64,
    default_ttl_for_null_entry: f64,
    ttl_jitter: f64,
    key_validator: KeyValidator<K>,
    cost_estimator: CostEstimator<V>,
    time_source: Option<Arc<dyn TimeSource>>,
    random_source: Option<Arc<dyn RandomSource>>,
    stats_callback: Option<StatsCallback>,
}

impl<K, V> CacheConfigBuilder<K, V>
where
    K: 'static,
    V: 'static,
{
    pub fn new() -> Self {
        CacheConfigBuilder {
            enable_thread_synchronization: true,
            capacity: 1024,
            memory_budget: None,
            default_ttl: f64::INFINITY,
            default_ttl_for_null_entry: f64::INFINITY,
            ttl_jitter: 0.0,
            key_validator: Arc::new(|_: &K| true),
            cost_estimator: Arc::new(|_: &V| DEFAULT_ENTRY_COST),
            time_source: None,
            random_source: None,
            stats_callback: None,
        }
    }

    pub fn enable_thread_synchronization(mut self, enabled: bool) -> Self {
        self.enable_thread_synchronization = enabled;
        self
    }

    pub fn capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn memory_budget(mut self, budget: i64) -> Self {
        self.memory_budget = Some(budget);
        self
    }

    pub fn default_ttl(mut self, seconds: f64) -> Self {
        self.default_ttl = seconds;
        self
    }

    pub fn default_ttl_for_null_entry(mut self, seconds: f64) -> Self {
        self.default_ttl_for_null_entry = seconds;
        self
    }

    pub fn ttl_jitter(mut self, seconds: f64) -> Self {
        self.ttl_jitter = seconds.abs();
        self
    }

    pub fn key_validator(mut self, validator: impl Fn(&K) -> bool + Send + Sync + 'static) -> Self {
        self.key_validator = Arc::new(validator);
        self
    }

    pub fn cost_estimator(mut self, estimator: impl Fn(&V) -> u64 + Send + Sync + 'static) -> Self {
        self.cost_estimator = Arc::new(estimator);
        self
    }

    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    pub fn random_source(mut self, random_source: Arc<dyn RandomSource>) -> Self {
        self.random_source = Some(random_source);
        self
    }

    pub fn stats_callback(
        mut self,
        callback: impl Fn(&Statistics, AccessRecord) + Send + Sync + 'static,
    ) -> Self {
        self.stats_callback = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> CacheConfig<K, V> {
        CacheConfig {
            enable_thread_synchronization: self.enable_thread_synchronization,
            capacity: self.capacity.max(0) as usize,
            memory_budget: self.memory_budget,
            default_ttl: self.default_ttl,
            default_ttl_for_null_entry: self.default_ttl_for_null_entry,
            ttl_jitter: self.ttl_jitter,
            key_validator: self.key_validator,
            cost_estimator: self.cost_estimator,
            time_source: self
                .time_source
                .unwrap_or_else(|| Arc::new(monstra_core::SystemTimeSource::new())),
            random_source: self
                .random_source
                .unwrap_or_else(|| Arc::new(crate::random::ThreadRandomSource)),
            stats_callback: self.stats_callback,
        }
    }
}

impl<K, V> Default for CacheConfigBuilder<K, V>
where
    K: 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
