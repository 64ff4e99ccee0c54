//! # monstra
//!
//! The consumer-facing façade over the Monstra subsystems: a bounded,
//! TTL-aware, priority-aware cache ([`cache`]), single-flight execution
//! coalescing, and a keyed task manager built on top of it ([`task`]). Most
//! applications only need this crate; [`monstra_core`], [`monstra_cache`],
//! and [`monstra_task`] remain independently usable for callers who want a
//! narrower dependency footprint.

pub mod cache {
    pub use monstra_cache::{
        AccessRecord, CacheConfig, CacheConfigBuilder, CacheEngine, CacheValue, FixedRandomSource, GetResult,
        RandomSource, Statistics, ThreadRandomSource, DEFAULT_ENTRY_COST,
    };
}

pub mod task {
    pub use monstra_task::{
        AsyncExecution, BoxFuture, DataProvider, DelayPolicy, Executor, KeyedTaskManager, OngoingStrategy,
        PriorityStrategy, RetryPolicy, SingleFlightTask, TaskError, TaskManagerConfig, TaskManagerConfigBuilder,
        TaskResult,
    };
}

pub mod primitives {
    pub use monstra_core::{
        Arena, BoundedBinaryHeap, GetOutcome, Handle, HeapEvent, IntrusiveDoublyLinkedList, Lean, ManualTimeSource,
        PriorityLruMap, SystemTimeSource, TimeSource, Timestamp, TtlPriorityLruMap,
    };
}

pub use cache::{CacheConfig, CacheEngine, CacheValue, GetResult};
pub use task::{KeyedTaskManager, RetryPolicy, SingleFlightTask, TaskError, TaskResult};
