//! # Priority-Bucketed LRU Map
//!
//! Purpose: a `K -> V` map partitioned by a real-valued priority, LRU
//! ordered within each priority, that evicts from the lowest-priority,
//! least-recently-used slot when it must make room.
//!
//! ## Design Principles
//!
//! 1. **Intrusive Buckets Owned By The Map**: each priority bucket is a
//!    head/tail pair of arena handles; nodes live in the map's own arena so
//!    there are no back-pointers crossing an ownership boundary.
//! 2. **Sorted Priority Sequence**: priorities are kept in a `BTreeMap` so
//!    "lowest non-empty priority" is a `first_key_value` lookup; empty
//!    buckets are dropped immediately.
//! 3. **Overwrite Never Evicts**: setting an existing key updates it in
//!    place at its existing priority and moves it to MRU; only a brand new
//!    key can trigger eviction.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::Hash;

use ahash::RandomState;
use hashbrown::HashMap;

use crate::arena::{Arena, Handle};

#[derive(Debug, Clone, Copy)]
struct OrderedPriority(f64);

impl PartialEq for OrderedPriority {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for OrderedPriority {}
impl PartialOrd for OrderedPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct Entry<K, V> {
    key: K,
    value: V,
    priority: OrderedPriority,
    prev: Option<Handle>,
    next: Option<Handle>,
}

#[derive(Default)]
struct Bucket {
    /// Most-recently-used end.
    head: Option<Handle>,
    /// Least-recently-used end.
    tail: Option<Handle>,
    len: usize,
}

/// Map from `K` to `V`, partitioned by priority with LRU order within each
/// priority class. Evicts from the lowest priority, least-recently-used
/// entry when a fresh insert would exceed capacity.
pub struct PriorityLruMap<K, V> {
    arena: Arena<Entry<K, V>>,
    index: HashMap<K, Handle, RandomState>,
    buckets: BTreeMap<OrderedPriority, Bucket>,
    capacity: usize,
}

impl<K, V> PriorityLruMap<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        PriorityLruMap {
            arena: Arena::new(),
            index: HashMap::with_hasher(RandomState::new()),
            buckets: BTreeMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn priority_of(&self, key: &K) -> Option<f64> {
        let handle = *self.index.get(key)?;
        self.arena.get(handle).map(|e| e.priority.0)
    }

    /// Reads a value without disturbing LRU order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let handle = *self.index.get(key)?;
        self.arena.get(handle).map(|e| &e.value)
    }

    /// Reads a value and moves it to the most-recently-used position within
    /// its priority bucket.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let handle = *self.index.get(key)?;
        let priority = self.arena.get(handle)?.priority;
        self.touch(handle, priority);
        self.arena.get(handle).map(|e| &e.value)
    }

    /// Inserts or overwrites `key`. Overwriting an existing key keeps its
    /// current priority bucket (the `priority` argument is ignored in that
    /// case, per spec) and moves it to MRU without evicting anything. A
    /// brand new key, inserted while the map is already full, evicts the
    /// global least-recently-used entry of the lowest non-empty priority
    /// and returns it.
    pub fn set(&mut self, key: K, value: V, priority: f64) -> Option<(K, V)> {
        if let Some(&handle) = self.index.get(&key) {
            let existing_priority = self.arena[handle].priority;
            self.arena[handle].value = value;
            self.touch(handle, existing_priority);
            return None;
        }

        if self.capacity == 0 {
            // Nothing can ever be admitted; report the incoming pair as
            // evicted immediately.
            return Some((key, value));
        }

        let evicted = if self.is_full() {
            self.remove_least_valuable()
        } else {
            None
        };

        self.insert_new(key, value, priority);
        evicted
    }

    fn insert_new(&mut self, key: K, value: V, priority: f64) {
        let priority = OrderedPriority(priority);
        let handle = self.arena.insert(Entry {
            key: key.clone(),
            value,
            priority,
            prev: None,
            next: None,
        });
        self.index.insert(key, handle);
        self.link_front(priority, handle);
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let handle = self.index.remove(key)?;
        let priority = self.arena.get(handle)?.priority;
        self.detach(priority, handle);
        let entry = self.arena.remove(handle)?;
        Some(entry.value)
    }

    /// Removes the global least-recently-used entry of the lowest non-empty
    /// priority.
    pub fn remove_least_valuable(&mut self) -> Option<(K, V)> {
        let (&priority, bucket) = self.buckets.iter().next()?;
        let handle = bucket.tail?;
        self.detach(priority, handle);
        let entry = self.arena.remove(handle)?;
        self.index.remove(&entry.key);
        Some((entry.key, entry.value))
    }

    fn touch(&mut self, handle: Handle, priority: OrderedPriority) {
        let bucket = match self.buckets.get(&priority) {
            Some(b) => b,
            None => return,
        };
        if bucket.head == Some(handle) {
            return;
        }
        self.detach(priority, handle);
        self.link_front(priority, handle);
    }

    fn link_front(&mut self, priority: OrderedPriority, handle: Handle) {
        let bucket = self.buckets.entry(priority).or_default();
        let old_head = bucket.head;

        if let Some(entry) = self.arena.get_mut(handle) {
            entry.prev = None;
            entry.next = old_head;
        }

        if let Some(old_head) = old_head {
            if let Some(entry) = self.arena.get_mut(old_head) {
                entry.prev = Some(handle);
            }
        }

        let bucket = self.buckets.get_mut(&priority).expect("bucket just inserted");
        if bucket.tail.is_none() {
            bucket.tail = Some(handle);
        }
        bucket.head = Some(handle);
        bucket.len += 1;
    }

    fn detach(&mut self, priority: OrderedPriority, handle: Handle) {
        let (prev, next) = match self.arena.get(handle) {
            Some(e) => (e.prev, e.next),
            None => (None, None),
        };

        if let Some(prev) = prev {
            if let Some(e) = self.arena.get_mut(prev) {
                e.next = next;
            }
        }
        if let Some(next) = next {
            if let Some(e) = self.arena.get_mut(next) {
                e.prev = prev;
            }
        }

        if let Some(bucket) = self.buckets.get_mut(&priority) {
            if bucket.head == Some(handle) {
                bucket.head = next;
            }
            if bucket.tail == Some(handle) {
                bucket.tail = prev;
            }
            bucket.len -= 1;
            if bucket.len == 0 {
                self.buckets.remove(&priority);
            }
        }

        if let Some(e) = self.arena.get_mut(handle) {
            e.prev = None;
            e.next = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_eviction_within_single_priority() {
        let mut map = PriorityLruMap::new(3);
        assert_eq!(map.set("a", 1, 0.0), None);
        assert_eq!(map.set("b", 2, 0.0), None);
        assert_eq!(map.set("c", 3, 0.0), None);
        assert_eq!(map.get(&"a"), Some(&1));
        let evicted = map.set("d", 4, 0.0);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(map.get(&"a"), Some(&1));
        assert_eq!(map.get(&"c"), Some(&3));
        assert_eq!(map.get(&"d"), Some(&4));
    }

    #[test]
    fn priority_beats_recency() {
        let mut map = PriorityLruMap::new(2);
        map.set("A", 1, 1.0);
        map.set("B", 2, 2.0);
        let evicted = map.set("C", 3, 3.0);
        assert_eq!(evicted, Some(("A", 1)));
        assert_eq!(map.get(&"B"), Some(&2));
        assert_eq!(map.get(&"C"), Some(&3));
    }

    #[test]
    fn overwrite_never_evicts_and_keeps_priority() {
        let mut map = PriorityLruMap::new(1);
        map.set("a", 1, 5.0);
        let evicted = map.set("a", 2, 99.0);
        assert_eq!(evicted, None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.priority_of(&"a"), Some(5.0));
        assert_eq!(map.get(&"a"), Some(&2));
    }

    #[test]
    fn zero_capacity_rejects_every_insert() {
        let mut map: PriorityLruMap<&str, i32> = PriorityLruMap::new(0);
        let evicted = map.set("a", 1, 0.0);
        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn remove_missing_key_is_a_noop() {
        let mut map: PriorityLruMap<&str, i32> = PriorityLruMap::new(4);
        assert_eq!(map.remove(&"missing"), None);
    }
}
