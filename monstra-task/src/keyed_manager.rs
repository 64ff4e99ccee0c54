//! # Keyed Task Manager
//!
//! Purpose: the multi-key generalization of [`crate::SingleFlightTask`] — a
//! bounded `pending` queue feeding a bounded `running` set, backed by a
//! [`monstra_cache::CacheEngine`] for result caching and a [`DataProvider`]
//! for the actual work, with retry per key and batched fan-in for the batch
//! provider shapes.
//!
//! ## Design Principles
//!
//! 1. **Cache First, Dedupe Second**: `fetch` always consults the cache
//!    before touching `pending`/`running`, so a warm key never occupies a
//!    running slot.
//! 2. **Every Arrival Goes Through `pending` Before `running`**: `fetch`
//!    never promotes a key straight into `running`; it always queues first
//!    and then drains. A lone `fetch` drains by itself and dispatches alone.
//!    `fetch_many` queues its whole key set before draining once, so all of
//!    it is promoted together and grouped (up to `max_batch_size`) into one
//!    batch provider call when the shape is a batch provider.
//! 3. **A Key Occupies Its Running Slot Through All Its Retries**: a failed
//!    attempt that will retry never returns to `pending`.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;

use monstra_cache::{CacheEngine, CacheValue, GetResult};

use crate::error::{TaskError, TaskResult};
use crate::task_config::{DataProvider, PriorityStrategy, TaskManagerConfig};

type Completion<V, E> = Box<dyn FnOnce(TaskResult<V, E>) + Send>;

struct RunningEntry<V, E> {
    waiters: Vec<Completion<V, E>>,
    retry_policy: crate::retry::RetryPolicy,
}

struct ManagerState<K, V, E> {
    pending_order: VecDeque<K>,
    pending_waiters: HashMap<K, Vec<Completion<V, E>>, RandomState>,
    running: HashMap<K, RunningEntry<V, E>, RandomState>,
}

struct Inner<K, V, E>
where
    K: Clone + Eq + Hash,
{
    provider: DataProvider<K, V, E>,
    max_pending: usize,
    max_running: usize,
    base_retry_policy: crate::retry::RetryPolicy,
    priority_strategy: PriorityStrategy,
    cache: CacheEngine<K, V>,
    state: Mutex<ManagerState<K, V, E>>,
}

/// The multi-key, bounded-concurrency generalization of
/// [`crate::SingleFlightTask`]. Cheap to clone; every clone shares the same
/// pending queue, running set, and cache.
pub struct KeyedTaskManager<K, V, E>
where
    K: Clone + Eq + Hash,
{
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for KeyedTaskManager<K, V, E>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        KeyedTaskManager { inner: self.inner.clone() }
    }
}

impl<K, V, E> KeyedTaskManager<K, V, E>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(config: TaskManagerConfig<K, V, E>) -> Self {
        KeyedTaskManager {
            inner: Arc::new(Inner {
                provider: config.provider,
                max_pending: config.max_pending,
                max_running: config.max_running,
                base_retry_policy: config.retry_policy,
                priority_strategy: config.priority_strategy,
                cache: CacheEngine::new(config.cache_config),
                state: Mutex::new(ManagerState {
                    pending_order: VecDeque::new(),
                    pending_waiters: HashMap::with_hasher(RandomState::new()),
                    running: HashMap::with_hasher(RandomState::new()),
                }),
            }),
        }
    }

    pub fn cache(&self) -> &CacheEngine<K, V> {
        &self.inner.cache
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending_order.len()
    }

    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    /// Resolves `key`, consulting the cache first, then coalescing with any
    /// in-flight or queued request for the same key, and finally queueing it
    /// in `pending` before draining. Rejects with [`TaskError::Overflow`] if
    /// `pending` is already full.
    pub fn fetch(&self, key: K, completion: impl FnOnce(TaskResult<V, E>) + Send + 'static) {
        if self.resolve_or_enqueue(key, Box::new(completion)) {
            self.promote_pending();
        }
    }

    /// Awaitable form of [`Self::fetch`].
    pub async fn fetch_async(&self, key: K) -> TaskResult<V, E> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.fetch(key, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(TaskError::Cancellation))
    }

    /// Resolves every key in `keys` and fires `completion` once every one of
    /// them has reached a terminal state. Iteration order of the resulting
    /// map is unspecified. Every key that is neither cache-resident nor
    /// already in flight is queued before any of them is drained, so a batch
    /// provider sees the whole set in one call instead of one per key.
    pub fn fetch_many(
        &self,
        keys: Vec<K>,
        completion: impl FnOnce(HashMap<K, TaskResult<V, E>, RandomState>) + Send + 'static,
    ) {
        let total = keys.len();
        if total == 0 {
            tokio::spawn(async move { completion(HashMap::with_hasher(RandomState::new())) });
            return;
        }

        let results: Arc<Mutex<HashMap<K, TaskResult<V, E>, RandomState>>> =
            Arc::new(Mutex::new(HashMap::with_hasher(RandomState::new())));
        let remaining = Arc::new(std::sync::atomic::AtomicUsize::new(total));
        let completion = Arc::new(Mutex::new(Some(completion)));

        let mut needs_drain = false;
        for key in keys {
            let results = results.clone();
            let remaining = remaining.clone();
            let completion = completion.clone();
            let key_for_map = key.clone();
            let per_key: Completion<V, E> = Box::new(move |outcome| {
                results.lock().insert(key_for_map, outcome);
                if remaining.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                    if let Some(done) = completion.lock().take() {
                        let gathered = std::mem::replace(&mut *results.lock(), HashMap::with_hasher(RandomState::new()));
                        done(gathered);
                    }
                }
            });
            if self.resolve_or_enqueue(key, per_key) {
                needs_drain = true;
            }
        }

        if needs_drain {
            self.promote_pending();
        }
    }

    /// Consults the cache and, on a miss, queues `key` in `pending`
    /// (coalescing with an existing in-flight or queued waiter list).
    /// Returns `true` if `key` was freshly queued and the caller should
    /// drain `pending` afterward; `false` if the cache answered directly,
    /// the waiter coalesced into an existing entry, or `pending` was full.
    fn resolve_or_enqueue(&self, key: K, completion: Completion<V, E>) -> bool {
        match self.inner.cache.get(&key) {
            GetResult::HitValue(v) => {
                tokio::spawn(async move { completion(Ok(Some(v))) });
                return false;
            }
            GetResult::HitAbsent => {
                tokio::spawn(async move { completion(Ok(None)) });
                return false;
            }
            GetResult::InvalidKey => {
                tokio::spawn(async move { completion(Err(TaskError::ValidationError)) });
                return false;
            }
            GetResult::Miss => {}
        }

        match self.enqueue(key, completion) {
            None => true,
            Some(completion) => {
                tokio::spawn(async move { completion(Err(TaskError::Overflow)) });
                false
            }
        }
    }

    /// Coalesces `completion` into `running`/`pending` for `key`, or queues
    /// a new pending entry if there is room. Returns the completion back to
    /// the caller (to be rejected with [`TaskError::Overflow`]) if `pending`
    /// is already full.
    fn enqueue(&self, key: K, completion: Completion<V, E>) -> Option<Completion<V, E>> {
        let mut state = self.inner.state.lock();

        if let Some(running) = state.running.get_mut(&key) {
            running.waiters.push(completion);
            return None;
        }

        if let Some(waiters) = state.pending_waiters.get_mut(&key) {
            waiters.push(completion);
            return None;
        }

        if state.pending_order.len() < self.inner.max_pending {
            state.pending_waiters.insert(key.clone(), vec![completion]);
            state.pending_order.push_back(key);
            return None;
        }

        Some(completion)
    }

    fn promote_pending(&self) {
        let mut state = self.inner.state.lock();
        let mut promoted = Vec::new();

        while state.running.len() < self.inner.max_running {
            let key = match self.inner.priority_strategy {
                PriorityStrategy::Fifo => state.pending_order.pop_front(),
                PriorityStrategy::Lifo => state.pending_order.pop_back(),
            };
            let key = match key {
                Some(k) => k,
                None => break,
            };
            let waiters = state.pending_waiters.remove(&key).unwrap_or_default();
            state.running.insert(
                key.clone(),
                RunningEntry { waiters, retry_policy: self.inner.base_retry_policy },
            );
            promoted.push(key);
        }
        drop(state);

        match &self.inner.provider {
            DataProvider::AsyncBatch { max_batch_size, .. } => {
                for chunk in promoted.chunks((*max_batch_size).max(1)) {
                    self.dispatch_for_keys(chunk.to_vec());
                }
            }
            DataProvider::SyncBatch(_) => {
                self.dispatch_for_keys(promoted);
            }
            DataProvider::SyncMono(_) | DataProvider::AsyncMono(_) => {
                for key in promoted {
                    self.dispatch_for_keys(vec![key]);
                }
            }
        }
    }

    fn dispatch_for_keys(&self, keys: Vec<K>) {
        if keys.is_empty() {
            return;
        }

        match &self.inner.provider {
            DataProvider::SyncMono(provider) => {
                for key in keys {
                    let outcome = provider(&key);
                    self.handle_provider_outcome(key, outcome);
                }
            }
            DataProvider::AsyncMono(provider) => {
                for key in keys {
                    let fut = provider(key.clone());
                    let manager = self.clone();
                    tokio::spawn(async move {
                        let outcome = fut.await;
                        manager.handle_provider_outcome(key, outcome);
                    });
                }
            }
            DataProvider::SyncBatch(provider) => {
                let mut results = provider(&keys);
                for key in keys {
                    let outcome = results.remove(&key).unwrap_or(Ok(None));
                    self.handle_provider_outcome(key, outcome);
                }
            }
            DataProvider::AsyncBatch { provider, .. } => {
                let fut = provider(keys.clone());
                let manager = self.clone();
                tokio::spawn(async move {
                    let mut results = fut.await;
                    for key in keys {
                        let outcome = results.remove(&key).unwrap_or(Ok(None));
                        manager.handle_provider_outcome(key, outcome);
                    }
                });
            }
        }
    }

    fn handle_provider_outcome(&self, key: K, outcome: Result<Option<V>, E>) {
        match outcome {
            Ok(value) => {
                let payload = match &value {
                    Some(v) => CacheValue::Value(v.clone()),
                    None => CacheValue::Absent,
                };
                self.inner.cache.set(key.clone(), payload, 0.0, None);

                let mut state = self.inner.state.lock();
                let entry = state.running.remove(&key);
                drop(state);
                if let Some(entry) = entry {
                    self.deliver(entry.waiters, Ok(value));
                }
                self.promote_pending();
            }
            Err(err) => {
                let mut state = self.inner.state.lock();
                let Some(running) = state.running.get_mut(&key) else {
                    return;
                };
                let policy = running.retry_policy;

                if policy.should_retry() {
                    let delay = policy.next_delay();
                    running.retry_policy = policy.advance();
                    drop(state);
                    tracing::warn!(delay, "keyed task attempt failed, retrying");
                    let manager = self.clone();
                    tokio::spawn(async move {
                        if delay > 0.0 {
                            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                        }
                        manager.dispatch_for_keys(vec![key]);
                    });
                } else {
                    let entry = state.running.remove(&key);
                    drop(state);
                    tracing::warn!("keyed task retry budget exhausted");
                    if let Some(entry) = entry {
                        self.deliver(entry.waiters, Err(TaskError::RetryExhausted(err)));
                    }
                    self.promote_pending();
                }
            }
        }
    }

    fn deliver(&self, waiters: Vec<Completion<V, E>>, result: TaskResult<V, E>) {
        if waiters.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for waiter in waiters {
                waiter(result.clone());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager_with_sync_provider(
        calls: Arc<AtomicUsize>,
        max_running: usize,
    ) -> KeyedTaskManager<u32, i32, String> {
        let provider: DataProvider<u32, i32, String> = DataProvider::SyncMono(Arc::new(move |key: &u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            if *key == 999 {
                Ok(None)
            } else {
                Ok(Some(*key as i32 * 10))
            }
        }));
        let config = TaskManagerConfig::builder(provider).max_running(max_running).build();
        KeyedTaskManager::new(config)
    }

    #[tokio::test]
    async fn fetch_returns_provider_value_and_caches_it() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = manager_with_sync_provider(calls.clone(), 8);

        assert_eq!(manager.fetch_async(5).await, Ok(Some(50)));
        assert_eq!(manager.fetch_async(5).await, Ok(Some(50)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_provider_result_caches_as_hit_absent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = manager_with_sync_provider(calls.clone(), 8);

        assert_eq!(manager.fetch_async(999).await, Ok(None));
        assert_eq!(manager.fetch_async(999).await, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_fetches_for_same_key_coalesce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = manager_with_sync_provider(calls.clone(), 8);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.fetch_async(3).await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(Some(30)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pending_queue_overflows_past_max_pending() {
        let slow_calls = Arc::new(AtomicUsize::new(0));
        let provider: DataProvider<u32, i32, String> = DataProvider::AsyncMono(Arc::new({
            let slow_calls = slow_calls.clone();
            move |key: u32| {
                let slow_calls = slow_calls.clone();
                Box::pin(async move {
                    slow_calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<Option<i32>, String>(Some(key as i32))
                })
            }
        }));
        let config = TaskManagerConfig::builder(provider).max_running(1).max_pending(1).build();
        let manager = KeyedTaskManager::new(config);

        let running_slot = manager.fetch_async(1);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let pending_slot = manager.fetch_async(2);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let overflowed = manager.fetch_async(3).await;

        assert_eq!(overflowed, Err(TaskError::Overflow));
        assert_eq!(running_slot.await, Ok(Some(1)));
        assert_eq!(pending_slot.await, Ok(Some(2)));
    }

    #[tokio::test]
    async fn retry_exhaustion_delivers_retry_exhausted() {
        let provider: DataProvider<u32, i32, String> = DataProvider::SyncMono(Arc::new(|_: &u32| Err("boom".to_string())));
        let config = TaskManagerConfig::builder(provider)
            .retry_policy(RetryPolicy::count(1, crate::retry::DelayPolicy::fixed(0.0)))
            .build();
        let manager = KeyedTaskManager::new(config);

        let result = manager.fetch_async(1).await;
        assert_eq!(result, Err(TaskError::RetryExhausted("boom".to_string())));
    }

    #[tokio::test]
    async fn batch_provider_is_invoked_with_unique_keys() {
        let seen_batches: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
        let provider: DataProvider<u32, i32, String> = DataProvider::SyncBatch(Arc::new({
            let seen_batches = seen_batches.clone();
            move |keys: &[u32]| {
                seen_batches.lock().push(keys.to_vec());
                keys.iter().map(|&k| (k, Ok(Some(k as i32)))).collect()
            }
        }));
        let config = TaskManagerConfig::builder(provider).max_running(8).build();
        let manager = KeyedTaskManager::new(config);

        manager.fetch_many(vec![1, 2, 3], |_| {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.fetch_async(1).await, Ok(Some(1)));
        assert_eq!(seen_batches.lock().len(), 1);
    }
}
