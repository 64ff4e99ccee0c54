//! # Cache Engine
//!
//! Purpose: the user-facing cache layer — key validation, TTL jitter,
//! absence-marker caching, byte-cost accounting, and statistics — built on
//! top of [`monstra_core::TtlPriorityLruMap`].
//!
//! ## Design Principles
//!
//! 1. **Never Throws**: every adverse input (invalid key, oversize value,
//!    zero capacity) degrades to a no-op-plus-evicted-report rather than an
//!    error.
//! 2. **Collaborators Called Unlocked**: the key validator, cost estimator,
//!    time source, and random source are always called before the internal
//!    mutex is acquired, so a reentrant callback can never deadlock against
//!    this engine. The statistics callback is the one deliberate exception,
//!    invoked under the mutex exactly as specified.
//! 3. **Cheap, Shareable Handles**: `CacheEngine` is a thin `Arc` handle;
//!    cloning it is O(1) and every clone observes the same state.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use monstra_core::{GetOutcome, Timestamp, TtlPriorityLruMap};

use crate::config::CacheConfig;
use crate::stats::{AccessRecord, Statistics};

/// The content of a cache entry: either a real value or the distinguished
/// absence marker (a cached negative result).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue<V> {
    Value(V),
    Absent,
}

impl<V> CacheValue<V> {
    pub fn is_absent(&self) -> bool {
        matches!(self, CacheValue::Absent)
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            CacheValue::Value(v) => Some(v),
            CacheValue::Absent => None,
        }
    }
}

/// Outcome of [`CacheEngine::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult<V> {
    InvalidKey,
    Miss,
    HitValue(V),
    HitAbsent,
}

/// Fixed cost charged for the absence marker, since it carries no caller
/// value to estimate. Implementation-defined but finite, per spec.
const ABSENT_COST: u64 = 8;

#[derive(Clone)]
struct EntryRecord<V> {
    payload: CacheValue<V>,
    cost: u64,
}

struct State<K, V>
where
    K: Clone + Eq + Hash,
{
    map: TtlPriorityLruMap<K, EntryRecord<V>>,
    total_cost: u64,
    stats: Statistics,
}

struct Inner<K, V>
where
    K: Clone + Eq + Hash,
{
    config: CacheConfig<K, V>,
    state: Mutex<State<K, V>>,
}

/// A bounded, TTL-aware, priority-aware cache. Cheap to clone; every clone
/// shares the same underlying state.
pub struct CacheEngine<K, V>
where
    K: Clone + Eq + Hash,
{
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for CacheEngine<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        CacheEngine {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> CacheEngine<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + 'static,
{
    pub fn new(config: CacheConfig<K, V>) -> Self {
        let capacity = config.capacity;
        CacheEngine {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    map: TtlPriorityLruMap::new(capacity),
                    total_cost: 0,
                    stats: Statistics::default(),
                }),
            }),
        }
    }

    fn record(&self, state: &mut State<K, V>, record: AccessRecord) {
        state.stats.record(record);
        if let Some(cb) = &self.inner.config.stats_callback {
            cb(&state.stats, record);
        }
    }

    /// Reads `key`. Reading an expired entry is equivalent to a miss and
    /// also evicts it lazily.
    pub fn get(&self, key: &K) -> GetResult<V> {
        if !(self.inner.config.key_validator)(key) {
            tracing::debug!("get rejected by key validator");
            let mut state = self.inner.state.lock();
            self.record(&mut state, AccessRecord::InvalidKey);
            return GetResult::InvalidKey;
        }

        let now = self.inner.config.time_source.now();
        let mut state = self.inner.state.lock();
        match state.map.get(key, now) {
            GetOutcome::Missing => {
                self.record(&mut state, AccessRecord::Miss);
                GetResult::Miss
            }
            GetOutcome::Found(entry) => match entry.payload {
                CacheValue::Absent => {
                    self.record(&mut state, AccessRecord::AbsentHit);
                    GetResult::HitAbsent
                }
                CacheValue::Value(v) => {
                    self.record(&mut state, AccessRecord::ValueHit);
                    GetResult::HitValue(v)
                }
            },
        }
    }

    /// Convenience wrapper over [`Self::get`] for callers that only care
    /// about real values, folding `Miss`/`InvalidKey`/`HitAbsent` together.
    pub fn get_value(&self, key: &K) -> Option<V> {
        match self.get(key) {
            GetResult::HitValue(v) => Some(v),
            _ => None,
        }
    }

    /// Inserts `value_or_absent` under `key`. Returns every entry evicted
    /// as a side effect, including — on rejection (invalid key, oversize
    /// cost, zero capacity/budget, non-positive TTL, or an eviction loop
    /// that can make no further progress) — the caller's own value.
    pub fn set(
        &self,
        key: K,
        value_or_absent: CacheValue<V>,
        priority: f64,
        ttl: Option<f64>,
    ) -> Vec<CacheValue<V>> {
        if !(self.inner.config.key_validator)(&key) {
            return Vec::new();
        }

        let now = self.inner.config.time_source.now();
        let base_ttl = ttl.unwrap_or(match &value_or_absent {
            CacheValue::Value(_) => self.inner.config.default_ttl,
            CacheValue::Absent => self.inner.config.default_ttl_for_null_entry,
        });
        let jittered_ttl = self.apply_jitter(base_ttl);
        let expires_at = if jittered_ttl.is_infinite() {
            Timestamp::INFINITY
        } else {
            now.add_secs(jittered_ttl)
        };

        let cost = match &value_or_absent {
            CacheValue::Value(v) => (self.inner.config.cost_estimator)(v),
            CacheValue::Absent => ABSENT_COST,
        };

        let mut state = self.inner.state.lock();

        if let Some(budget) = self.inner.config.memory_budget {
            if budget <= 0 || cost as i64 > budget {
                tracing::debug!(cost, budget, "set rejected, entry cost exceeds memory budget");
                return vec![value_or_absent];
            }
        }

        let had_old = state.map.contains_key(&key);
        let old_cost = if had_old {
            state.map.peek(&key).map(|e| e.cost).unwrap_or(0)
        } else {
            0
        };

        let bailout_payload = value_or_absent.clone();
        let record = EntryRecord {
            payload: value_or_absent,
            cost,
        };

        let evicted_on_set = state.map.set(key.clone(), record, priority, expires_at, now);
        let mut evicted = Vec::new();

        if state.map.contains_key(&key) {
            state.total_cost = state.total_cost - old_cost + cost;
            if let Some((_, victim)) = evicted_on_set {
                state.total_cost -= victim.cost;
                evicted.push(victim.payload);
            }
        } else if let Some((_, rejected)) = evicted_on_set {
            evicted.push(rejected.payload);
            return evicted;
        }

        loop {
            let over_capacity = state.map.len() > state.map.capacity();
            let over_budget = matches!(
                self.inner.config.memory_budget,
                Some(budget) if state.total_cost as i64 > budget
            );
            if !over_capacity && !over_budget {
                break;
            }
            if !Self::evict_one(&mut state, now, &mut evicted) {
                tracing::warn!("eviction loop made no progress, rejecting the entry just inserted");
                evicted.push(bailout_payload.clone());
                break;
            }
        }

        evicted
    }

    fn apply_jitter(&self, base_ttl: f64) -> f64 {
        if base_ttl.is_infinite() || self.inner.config.ttl_jitter <= 0.0 {
            return base_ttl;
        }
        let jitter = self.inner.config.ttl_jitter;
        let sample = self.inner.config.random_source.uniform(); // in [0, 1)
        let offset = (sample * 2.0 - 1.0) * jitter;
        let jittered = base_ttl + offset;
        if jittered <= 0.0 {
            f64::MIN_POSITIVE
        } else {
            jittered
        }
    }

    fn evict_one(state: &mut State<K, V>, now: Timestamp, evicted: &mut Vec<CacheValue<V>>) -> bool {
        let expired = state.map.remove_expired_entries(now);
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "evicted expired entries");
            for (_, rec) in expired {
                state.total_cost -= rec.cost;
                evicted.push(rec.payload);
            }
            return true;
        }

        if let Some((_, rec)) = state.map.remove_least_valuable() {
            tracing::debug!("evicted lowest-priority-LRU entry");
            state.total_cost -= rec.cost;
            evicted.push(rec.payload);
            return true;
        }

        false
    }

    pub fn remove(&self, key: &K) -> Option<CacheValue<V>> {
        let mut state = self.inner.state.lock();
        let record = state.map.remove(key)?;
        state.total_cost -= record.cost;
        Some(record.payload)
    }

    pub fn remove_least_valuable(&self) -> Option<CacheValue<V>> {
        let mut state = self.inner.state.lock();
        let (_, record) = state.map.remove_least_valuable()?;
        state.total_cost -= record.cost;
        Some(record.payload)
    }

    pub fn remove_expired(&self) {
        let now = self.inner.config.time_source.now();
        let mut state = self.inner.state.lock();
        for (_, record) in state.map.remove_expired_entries(now) {
            state.total_cost -= record.cost;
        }
    }

    /// Evicts expired-first, then lowest-priority-LRU, until
    /// `count <= ceil(capacity * fraction)`.
    pub fn remove_to_fraction(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let now = self.inner.config.time_source.now();
        let mut state = self.inner.state.lock();
        let target = (state.map.capacity() as f64 * fraction).ceil() as usize;
        let mut scratch = Vec::new();
        while state.map.len() > target {
            if !Self::evict_one(&mut state, now, &mut scratch) {
                break;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().map.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.state.lock().map.is_full()
    }

    pub fn count(&self) -> usize {
        self.inner.state.lock().map.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.state.lock().stats
    }

    pub fn reset_statistics(&self) {
        self.inner.state.lock().stats.reset();
    }
}
