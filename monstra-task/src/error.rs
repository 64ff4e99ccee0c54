//! # Task Error Taxonomy
//!
//! Purpose: the terminal failure kinds a waiter on [`crate::SingleFlightTask`]
//! or [`crate::KeyedTaskManager`] can observe, mirroring the small
//! `#[derive(thiserror::Error)]` enums the storage layer uses for its own
//! client-facing errors.

/// A terminal failure delivered to a waiter. `ProviderError` is the only
/// kind ever seen pre-retry; everything else is terminal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError<E> {
    /// The user-supplied provider/executor returned a failure. Surfaced to
    /// waiters only when no further retry will be attempted — at that point
    /// it is wrapped in [`TaskError::RetryExhausted`] instead.
    #[error("provider error: {0}")]
    ProviderError(E),

    /// The retry budget was consumed without a success.
    #[error("retry budget exhausted: {0}")]
    RetryExhausted(E),

    /// `KeyedTaskManager`'s `pending` queue was full.
    #[error("pending queue overflow")]
    Overflow,

    /// The waiter was canceled by its caller or by `clear_result`.
    #[error("canceled")]
    Cancellation,

    /// The key failed the configured key validator.
    #[error("key rejected by validator")]
    ValidationError,
}

impl<E> PartialEq for TaskError<E> {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (TaskError::ProviderError(_), TaskError::ProviderError(_))
                | (TaskError::RetryExhausted(_), TaskError::RetryExhausted(_))
                | (TaskError::Overflow, TaskError::Overflow)
                | (TaskError::Cancellation, TaskError::Cancellation)
                | (TaskError::ValidationError, TaskError::ValidationError)
        )
    }
}

/// Outcome delivered to a waiter: either the computed value or a terminal
/// [`TaskError`]. A `None` value represents the cached-absence case, mirroring
/// the cache engine's `hitAbsent`.
pub type TaskResult<V, E> = Result<Option<V>, TaskError<E>>;
