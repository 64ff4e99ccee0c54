//! # Keyed Task Manager Configuration
//!
//! Purpose: the option table a [`crate::KeyedTaskManager`] is built from,
//! mirroring [`monstra_cache::CacheConfigBuilder`]'s builder-over-constructor
//! shape for the same reason — more than a handful of optional knobs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;

use monstra_cache::CacheConfig;

use crate::retry::RetryPolicy;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The four provider shapes a [`crate::KeyedTaskManager`] can fan work out
/// to, per spec §4.9. A batch provider's returned map may omit keys it has
/// nothing to say about; an omitted key is treated as `success(absent)`.
pub enum DataProvider<K, V, E> {
    SyncMono(Arc<dyn Fn(&K) -> Result<Option<V>, E> + Send + Sync>),
    AsyncMono(Arc<dyn Fn(K) -> BoxFuture<Result<Option<V>, E>> + Send + Sync>),
    SyncBatch(Arc<dyn Fn(&[K]) -> HashMap<K, Result<Option<V>, E>, RandomState> + Send + Sync>),
    AsyncBatch {
        provider: Arc<dyn Fn(Vec<K>) -> BoxFuture<HashMap<K, Result<Option<V>, E>, RandomState>> + Send + Sync>,
        max_batch_size: usize,
    },
}

/// Governs which pending key is promoted to `running` next when a slot
/// frees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityStrategy {
    Fifo,
    Lifo,
}

/// Resolved configuration for a [`crate::KeyedTaskManager`].
pub struct TaskManagerConfig<K, V, E> {
    pub(crate) provider: DataProvider<K, V, E>,
    pub max_pending: usize,
    pub max_running: usize,
    pub retry_policy: RetryPolicy,
    pub priority_strategy: PriorityStrategy,
    pub(crate) cache_config: CacheConfig<K, V>,
}

impl<K, V, E> TaskManagerConfig<K, V, E>
where
    K: 'static,
    V: 'static,
{
    pub fn builder(provider: DataProvider<K, V, E>) -> TaskManagerConfigBuilder<K, V, E> {
        TaskManagerConfigBuilder::new(provider)
    }
}

/// Builder for [`TaskManagerConfig`]. Defaults: `max_pending = 1024`,
/// `max_running = 64`, `retry_policy = never`, `priority_strategy = fifo`,
/// and a default [`CacheConfig`].
pub struct TaskManagerConfigBuilder<K, V, E> {
    provider: DataProvider<K, V, E>,
    max_pending: usize,
    max_running: usize,
    retry_policy: RetryPolicy,
    priority_strategy: PriorityStrategy,
    cache_config: Option<CacheConfig<K, V>>,
}

impl<K, V, E> TaskManagerConfigBuilder<K, V, E>
where
    K: 'static,
    V: 'static,
{
    pub fn new(provider: DataProvider<K, V, E>) -> Self {
        TaskManagerConfigBuilder {
            provider,
            max_pending: 1024,
            max_running: 64,
            retry_policy: RetryPolicy::never(),
            priority_strategy: PriorityStrategy::Fifo,
            cache_config: None,
        }
    }

    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn max_running(mut self, max_running: usize) -> Self {
        self.max_running = max_running;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn priority_strategy(mut self, strategy: PriorityStrategy) -> Self {
        self.priority_strategy = strategy;
        self
    }

    pub fn cache_config(mut self, cache_config: CacheConfig<K, V>) -> Self {
        self.cache_config = Some(cache_config);
        self
    }

    pub fn build(self) -> TaskManagerConfig<K, V, E> {
        TaskManagerConfig {
            provider: self.provider,
            max_pending: self.max_pending,
            max_running: self.max_running,
            retry_policy: self.retry_policy,
            priority_strategy: self.priority_strategy,
            cache_config: self.cache_config.unwrap_or_else(|| CacheConfig::builder().build()),
        }
    }
}
