//! # monstra-task
//!
//! Single-flight execution coalescing ([`SingleFlightTask`]) and its
//! multi-key generalization ([`KeyedTaskManager`]), both built on
//! [`monstra_cache::CacheEngine`] for result caching.

pub mod error;
pub mod keyed_manager;
pub mod retry;
pub mod single_flight;
pub mod task_config;

pub use error::{TaskError, TaskResult};
pub use keyed_manager::KeyedTaskManager;
pub use retry::{DelayPolicy, RetryPolicy};
pub use single_flight::{AsyncExecution, Executor, OngoingStrategy, SingleFlightTask};
pub use task_config::{BoxFuture, DataProvider, PriorityStrategy, TaskManagerConfig, TaskManagerConfigBuilder};
