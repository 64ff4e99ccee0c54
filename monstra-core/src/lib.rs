//! # monstra-core
//!
//! Primitive, allocation-conscious data structures shared by the cache and
//! task layers built on top of them: a monotonic [`TimeSource`], a stable
//! generational [`Arena`] and [`Handle`], a bounded intrusive doubly linked
//! list, a bounded binary heap with position tracking, and the two
//! composable maps that back the cache engine: [`PriorityLruMap`] and
//! [`TtlPriorityLruMap`].
//!
//! ## Design Principles
//!
//! 1. **Index-Based Intrusive Structures**: every list/heap node lives in a
//!    dense arena and is referenced by a generational [`Handle`] rather than
//!    a pointer, keeping updates O(1)/O(log n) without unsafe code.
//! 2. **No Cross-Boundary Back-Pointers**: bucket and list heads are owned by
//!    the map that defines them; nodes are owned by the arena.
//! 3. **Pure Functions At The Seams**: time, randomness, and comparators are
//!    injected, never read from ambient global state.

pub mod arena;
pub mod bounded_heap;
pub mod intrusive_list;
pub mod priority_lru;
pub mod time;
pub mod ttl_priority_lru;

pub use arena::{Arena, Handle};
pub use bounded_heap::{BoundedBinaryHeap, HeapEvent, Lean};
pub use intrusive_list::IntrusiveDoublyLinkedList;
pub use priority_lru::PriorityLruMap;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};
pub use ttl_priority_lru::{GetOutcome, TtlPriorityLruMap};
