//! # Single-Flight Task
//!
//! Purpose: coalesce concurrent requests for one logical result into a
//! single execution, cache the success for a TTL, and retry failures per a
//! [`RetryPolicy`], all serialized by one per-task mutex.
//!
//! ## Design Principles
//!
//! 1. **Waiters Are A Vector Of Completion Handles**: canceling one waiter
//!    replaces its slot with `None` rather than shrinking the vector, so
//!    in-flight iteration never has to deal with shifting indices.
//! 2. **Generation-Tagged Attempts**: `clear_result(cancel)` bumps a
//!    generation counter; a completion callback from an executor dispatched
//!    under a stale generation is silently discarded.
//! 3. **Callback Queue Is A Spawned Task**: delivering a terminal result to
//!    every waiter happens inside one `tokio::spawn`, in attach order,
//!    regardless of how many worker threads the runtime uses.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;

use monstra_core::{SystemTimeSource, TimeSource, Timestamp};

use crate::error::{TaskError, TaskResult};
use crate::retry::RetryPolicy;

type Completion<V, E> = Box<dyn FnOnce(TaskResult<V, E>) + Send>;
/// The user-supplied unit of work: receives a completion callback and
/// arranges, on whatever execution context it chooses, to invoke it exactly
/// once with the outcome.
pub type Executor<V, E> = Arc<dyn Fn(Box<dyn FnOnce(Result<V, E>) + Send>) + Send + Sync>;

/// What happens to the current in-flight attempt (if any) when
/// [`SingleFlightTask::clear_result`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OngoingStrategy {
    /// Let the current attempt run to completion; its result is still
    /// applied (and re-cached) when it lands.
    AllowComplete,
    /// Detach every current waiter immediately with [`TaskError::Cancellation`]
    /// and discard whatever the in-flight executor eventually reports.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
}

struct TaskState<V, E> {
    phase: Phase,
    cached: Option<(V, Timestamp)>,
    retry_policy: RetryPolicy,
    waiters: Vec<Option<(u64, Completion<V, E>)>>,
    next_waiter_id: u64,
    generation: u64,
}

struct Inner<V, E> {
    result_ttl: f64,
    base_retry_policy: RetryPolicy,
    executor: Executor<V, E>,
    time_source: Arc<dyn TimeSource>,
    state: Mutex<TaskState<V, E>>,
}

/// A single coalesced unit of asynchronous work. Cheap to clone; every
/// clone shares the same in-flight attempt and cached result.
pub struct SingleFlightTask<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for SingleFlightTask<V, E> {
    fn clone(&self) -> Self {
        SingleFlightTask { inner: self.inner.clone() }
    }
}

impl<V, E> SingleFlightTask<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(result_ttl: f64, retry_policy: RetryPolicy, executor: Executor<V, E>) -> Self {
        Self::with_time_source(result_ttl, retry_policy, executor, Arc::new(SystemTimeSource::new()))
    }

    pub fn with_time_source(
        result_ttl: f64,
        retry_policy: RetryPolicy,
        executor: Executor<V, E>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        SingleFlightTask {
            inner: Arc::new(Inner {
                result_ttl,
                base_retry_policy: retry_policy,
                executor,
                time_source,
                state: Mutex::new(TaskState {
                    phase: Phase::Idle,
                    cached: None,
                    retry_policy,
                    waiters: Vec::new(),
                    next_waiter_id: 0,
                    generation: 0,
                }),
            }),
        }
    }

    /// Requests the result. If a cached, unexpired success exists and
    /// `force_update` is false, `completion` is delivered immediately
    /// (still asynchronously, on the callback queue). Otherwise `completion`
    /// joins the waiter list for the in-flight (or freshly dispatched)
    /// attempt.
    pub fn execute(&self, force_update: bool, completion: impl FnOnce(TaskResult<V, E>) + Send + 'static) {
        let now = self.inner.time_source.now();
        let mut state = self.inner.state.lock();

        if !force_update {
            if let Some((value, expires_at)) = &state.cached {
                if now < *expires_at {
                    let value = value.clone();
                    drop(state);
                    tokio::spawn(async move { completion(Ok(Some(value))) });
                    return;
                }
            }
        }

        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        state.waiters.push(Some((id, Box::new(completion))));

        if state.phase == Phase::Idle {
            state.phase = Phase::Running;
            state.retry_policy = self.inner.base_retry_policy;
            let generation = state.generation;
            drop(state);
            self.dispatch_attempt(generation);
        }
    }

    /// Awaitable form of [`Self::execute`]. Dropping the returned future
    /// before it resolves cancels only this caller's waiter; the underlying
    /// attempt keeps running for any other waiters still attached.
    pub fn async_execute(&self, force_update: bool) -> AsyncExecution<V, E> {
        let now = self.inner.time_source.now();
        let mut state = self.inner.state.lock();
        let (tx, rx) = tokio::sync::oneshot::channel();

        if !force_update {
            if let Some((value, expires_at)) = &state.cached {
                if now < *expires_at {
                    let value = value.clone();
                    drop(state);
                    tokio::spawn(async move { let _ = tx.send(Ok(Some(value))); });
                    return AsyncExecution { task: self.clone(), waiter_id: None, rx, done: false };
                }
            }
        }

        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        state.waiters.push(Some((
            id,
            Box::new(move |result: TaskResult<V, E>| {
                let _ = tx.send(result);
            }),
        )));

        if state.phase == Phase::Idle {
            state.phase = Phase::Running;
            state.retry_policy = self.inner.base_retry_policy;
            let generation = state.generation;
            drop(state);
            self.dispatch_attempt(generation);
        }

        AsyncExecution { task: self.clone(), waiter_id: Some(id), rx, done: false }
    }

    fn cancel_waiter(&self, id: u64) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.waiters.iter_mut().find(|slot| matches!(slot, Some((wid, _)) if *wid == id)) {
            *slot = None;
        }
    }

    /// Discards the cached success. With [`OngoingStrategy::Cancel`], every
    /// waiter currently attached receives [`TaskError::Cancellation`] and
    /// any result the in-flight executor later reports is discarded.
    pub fn clear_result(&self, ongoing: OngoingStrategy, restart_when_idle: bool) {
        let mut state = self.inner.state.lock();
        state.cached = None;

        match ongoing {
            OngoingStrategy::AllowComplete => {
                let should_restart = restart_when_idle && state.phase == Phase::Idle;
                drop(state);
                if should_restart {
                    self.execute(false, |_| {});
                }
            }
            OngoingStrategy::Cancel => {
                state.generation += 1;
                state.phase = Phase::Idle;
                let waiters = std::mem::take(&mut state.waiters);
                drop(state);
                self.deliver_many(waiters, Err(TaskError::Cancellation));
                if restart_when_idle {
                    self.execute(false, |_| {});
                }
            }
        }
    }

    fn dispatch_attempt(&self, generation: u64) {
        tracing::debug!(generation, "dispatching single-flight attempt");
        let task = self.clone();
        let completion: Box<dyn FnOnce(Result<V, E>) + Send> = Box::new(move |result| {
            task.on_attempt_complete(generation, result);
        });
        (self.inner.executor)(completion);
    }

    fn on_attempt_complete(&self, generation: u64, result: Result<V, E>) {
        let now = self.inner.time_source.now();
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            tracing::debug!(generation, "discarding completion from a superseded attempt");
            return;
        }

        match result {
            Ok(value) => {
                let expires_at = if self.inner.result_ttl.is_infinite() {
                    Timestamp::INFINITY
                } else {
                    now.add_secs(self.inner.result_ttl)
                };
                state.cached = Some((value.clone(), expires_at));
                state.phase = Phase::Idle;
                let waiters = std::mem::take(&mut state.waiters);
                drop(state);
                self.deliver_many(waiters, Ok(Some(value)));
            }
            Err(err) => {
                let policy = state.retry_policy;
                if policy.should_retry() {
                    let delay = policy.next_delay();
                    state.retry_policy = policy.advance();
                    drop(state);
                    tracing::warn!(delay, "single-flight attempt failed, retrying");
                    let task = self.clone();
                    tokio::spawn(async move {
                        if delay > 0.0 {
                            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                        }
                        task.dispatch_attempt(generation);
                    });
                } else {
                    state.phase = Phase::Idle;
                    let waiters = std::mem::take(&mut state.waiters);
                    drop(state);
                    tracing::warn!("single-flight retry budget exhausted");
                    self.deliver_many(waiters, Err(TaskError::RetryExhausted(err)));
                }
            }
        }
    }

    fn deliver_many(&self, waiters: Vec<Option<(u64, Completion<V, E>)>>, result: TaskResult<V, E>) {
        if waiters.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for slot in waiters {
                if let Some((_, completion)) = slot {
                    completion(result.clone());
                }
            }
        });
    }
}

/// The future returned by [`SingleFlightTask::async_execute`]. Dropping it
/// before it resolves removes only this caller's waiter.
pub struct AsyncExecution<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    task: SingleFlightTask<V, E>,
    waiter_id: Option<u64>,
    rx: tokio::sync::oneshot::Receiver<TaskResult<V, E>>,
    done: bool,
}

impl<V, E> Future for AsyncExecution<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = TaskResult<V, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.done = true;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.done = true;
                Poll::Ready(Err(TaskError::Cancellation))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<V, E> Drop for AsyncExecution<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if !self.done {
            if let Some(id) = self.waiter_id {
                self.task.cancel_waiter(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_executor(calls: Arc<AtomicUsize>, value: i32) -> Executor<i32, String> {
        Arc::new(move |completion| {
            calls.fetch_add(1, Ordering::SeqCst);
            completion(Ok(value));
        })
    }

    #[tokio::test]
    async fn concurrent_executes_coalesce_into_one_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task: SingleFlightTask<i32, String> =
            SingleFlightTask::new(f64::INFINITY, RetryPolicy::never(), counting_executor(calls.clone(), 42));

        let mut handles = Vec::new();
        for _ in 0..20 {
            handles.push(task.async_execute(false));
        }
        for h in handles {
            assert_eq!(h.await, Ok(Some(42)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_result_short_circuits_the_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task: SingleFlightTask<i32, String> =
            SingleFlightTask::new(f64::INFINITY, RetryPolicy::never(), counting_executor(calls.clone(), 7));

        assert_eq!(task.async_execute(false).await, Ok(Some(7)));
        assert_eq!(task.async_execute(false).await, Ok(Some(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_exhaustion_reports_retry_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing: Executor<i32, String> = {
            let calls = calls.clone();
            Arc::new(move |completion| {
                calls.fetch_add(1, Ordering::SeqCst);
                completion(Err("boom".to_string()));
            })
        };
        let task: SingleFlightTask<i32, String> = SingleFlightTask::new(
            f64::INFINITY,
            RetryPolicy::count(2, crate::retry::DelayPolicy::fixed(0.0)),
            failing,
        );

        let result = task.async_execute(false).await;
        assert_eq!(result, Err(TaskError::RetryExhausted("boom".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn clear_result_cancel_notifies_every_waiter() {
        let never_completes: Executor<i32, String> = Arc::new(|_completion| {
            // Deliberately never calls completion, simulating a stuck executor.
        });
        let task: SingleFlightTask<i32, String> =
            SingleFlightTask::new(f64::INFINITY, RetryPolicy::never(), never_completes);

        let waiter_a = task.async_execute(false);
        let waiter_b = task.async_execute(false);
        task.clear_result(OngoingStrategy::Cancel, false);

        assert_eq!(waiter_a.await, Err(TaskError::Cancellation));
        assert_eq!(waiter_b.await, Err(TaskError::Cancellation));
    }

    #[tokio::test]
    async fn dropping_one_async_waiter_does_not_cancel_the_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task: SingleFlightTask<i32, String> =
            SingleFlightTask::new(f64::INFINITY, RetryPolicy::never(), counting_executor(calls.clone(), 99));

        let dropped = task.async_execute(false);
        let kept = task.async_execute(false);
        drop(dropped);

        assert_eq!(kept.await, Ok(Some(99)));
    }
}
