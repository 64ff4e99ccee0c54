//! # TTL-Indexed Priority-Bucketed LRU Map
//!
//! Purpose: layer a min-heap keyed by expiration time over a
//! [`PriorityLruMap`], giving O(log n) removal of any entry (by key, via a
//! tracked heap index) and bulk eviction of everything already expired.
//!
//! ## Design Principles
//!
//! 1. **Key As The Cross-Structure Handle**: rather than introduce a second
//!    generational handle, the key itself — already hashable, equatable,
//!    and cheap to clone in this codebase's usage — correlates an entry's
//!    slot in the priority-LRU map with its slot in the heap.
//! 2. **Heap Position Tracked, Never Scanned**: a `key -> heap index` map is
//!    kept current via the heap's move/insert/remove event callback, so
//!    removing an arbitrary key from the heap is O(log n), not O(n).
//! 3. **Expiration Is A Pure Function Of Now**: "expired" is always
//!    `now >= expires_at`; jitter and TTL are resolved once, at insert
//!    time, never recomputed on read.

use std::hash::Hash;
use std::sync::{Arc, Mutex};

use ahash::RandomState;
use hashbrown::HashMap;

use crate::bounded_heap::{BoundedBinaryHeap, HeapEvent, Lean};
use crate::priority_lru::PriorityLruMap;
use crate::time::Timestamp;

struct HeapItem<K> {
    expires_at: Timestamp,
    key: K,
}

/// Outcome of a TTL-aware read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome<V> {
    /// Key absent (or was present but already expired; the stale entry is
    /// evicted as a side effect of this call).
    Missing,
    Found(V),
}

/// A [`PriorityLruMap`] augmented with expiration. TTLs `<= 0` are treated
/// as "expired on arrival": `set` becomes a no-op that returns the value as
/// evicted. A non-finite expiration is stored as
/// [`Timestamp::INFINITY`] and never participates in the heap.
pub struct TtlPriorityLruMap<K, V>
where
    K: Clone + Eq + Hash,
{
    inner: PriorityLruMap<K, (V, Timestamp)>,
    heap: BoundedBinaryHeap<HeapItem<K>>,
    // Shared with the heap's move callback; `Mutex` only because the
    // callback closure must be `'static` and `Send` while this struct is
    // not itself behind a lock — contention is nonexistent since all
    // access happens from methods that already hold `&mut self`.
    heap_positions: Arc<Mutex<HashMap<K, usize, RandomState>>>,
}

impl<K, V> TtlPriorityLruMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let heap_positions: Arc<Mutex<HashMap<K, usize, RandomState>>> =
            Arc::new(Mutex::new(HashMap::with_hasher(RandomState::new())));
        let positions_cb = heap_positions.clone();

        let heap = BoundedBinaryHeap::with_event_callback(
            capacity.max(1),
            |a: &HeapItem<K>, b: &HeapItem<K>| {
                if a.expires_at < b.expires_at {
                    Lean::MoreTop
                } else if a.expires_at == b.expires_at {
                    Lean::Equal
                } else {
                    Lean::MoreBottom
                }
            },
            move |item, event| {
                let mut positions = positions_cb.lock().expect("heap_positions mutex poisoned");
                match event {
                    HeapEvent::Inserted { index } | HeapEvent::Moved { to: index, .. } => {
                        positions.insert(item.key.clone(), index);
                    }
                    HeapEvent::Removed { .. } => {
                        positions.remove(&item.key);
                    }
                }
            },
        );

        TtlPriorityLruMap {
            inner: PriorityLruMap::new(capacity),
            heap,
            heap_positions,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn priority_of(&self, key: &K) -> Option<f64> {
        self.inner.priority_of(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Reads a value without disturbing LRU order or checking expiration.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key).map(|(v, _)| v)
    }

    fn heap_index_of(&self, key: &K) -> Option<usize> {
        self.heap_positions
            .lock()
            .expect("heap_positions mutex poisoned")
            .get(key)
            .copied()
    }

    /// Inserts or overwrites `key` with an absolute `expires_at` and
    /// `priority`. `expires_at <= now` means "already expired": nothing is
    /// admitted and `value` is returned as evicted. The new expiration
    /// always replaces any previous one unconditionally, even on
    /// overwrite — the spec's chosen resolution for TTL-on-overwrite.
    pub fn set(&mut self, key: K, value: V, priority: f64, expires_at: Timestamp, now: Timestamp) -> Option<(K, V)> {
        if expires_at <= now {
            return Some((key, value));
        }

        if let Some(old_index) = self.heap_index_of(&key) {
            self.heap.remove_at(old_index);
        }

        let evicted = self.inner.set(key.clone(), (value, expires_at), priority);

        if let Some((evicted_key, _)) = &evicted {
            if let Some(idx) = self.heap_index_of(evicted_key) {
                self.heap.remove_at(idx);
            }
        }

        // `inner.set` rejects the pair outright (capacity == 0) by handing
        // it straight back as `evicted` keyed on our own key; only a
        // genuinely admitted entry should join the expiration heap.
        let admitted = self.inner.contains_key(&key);
        if admitted && !expires_at.is_infinite() {
            self.heap.insert(HeapItem { expires_at, key }, false);
        }

        evicted.map(|(k, (v, _))| (k, v))
    }

    /// Reads a value, evicting it first if it has already expired.
    pub fn get(&mut self, key: &K, now: Timestamp) -> GetOutcome<V>
    where
        V: Clone,
    {
        let expired = match self.inner.peek(key) {
            Some((_, expires_at)) => now >= *expires_at,
            None => return GetOutcome::Missing,
        };

        if expired {
            self.remove(key);
            return GetOutcome::Missing;
        }

        match self.inner.get(key) {
            Some((value, _)) => GetOutcome::Found(value.clone()),
            None => GetOutcome::Missing,
        }
    }

    /// Removes `key` regardless of expiration state.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if let Some(idx) = self.heap_index_of(key) {
            self.heap.remove_at(idx);
        }
        self.inner.remove(key).map(|(v, _)| v)
    }

    /// Removes the global least-recently-used entry of the lowest non-empty
    /// priority, expired or not.
    pub fn remove_least_valuable(&mut self) -> Option<(K, V)> {
        let (key, (value, _)) = self.inner.remove_least_valuable()?;
        if let Some(idx) = self.heap_index_of(&key) {
            self.heap.remove_at(idx);
        }
        Some((key, value))
    }

    /// Repeatedly pops the heap while its root has already expired,
    /// removing each from the underlying map. Returns the removed entries.
    pub fn remove_expired_entries(&mut self, now: Timestamp) -> Vec<(K, V)> {
        let mut removed = Vec::new();
        loop {
            let expired = match self.heap.peek() {
                Some(item) => item.expires_at <= now,
                None => false,
            };
            if !expired {
                break;
            }
            let item = self.heap.remove().expect("peeked Some above");
            if let Some((v, _)) = self.inner.remove(&item.key) {
                removed.push((item.key, v));
            }
        }
        removed
    }
}
