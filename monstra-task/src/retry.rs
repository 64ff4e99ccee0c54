//! # Retry Policy
//!
//! Purpose: a small tagged-variant state machine describing how many more
//! attempts remain and how long to wait before the next one. `advance()`
//! consumes the current policy and returns the next one, so the caller never
//! mutates delay state in place — mirroring the immutable-variant style the
//! spec's design notes call for over open-ended subclassing.

/// The largest delay this policy will ever report, in seconds. Prevents
/// `exponential`/`expThenFixed` from overflowing to `f64::INFINITY`.
pub const MAX_FINITE_DELAY_SECS: f64 = 24.0 * 60.0 * 60.0;

/// How the delay between retry attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DelayPolicy {
    Fixed { delay: f64 },
    Exponential { delay: f64, rate: f64 },
    ExpThenFixed { delay: f64, final_delay: f64, remaining_exp_steps: u32, rate: f64 },
    FixedThenExp { delay: f64, initial_exp_delay: f64, remaining_fixed_steps: u32, rate: f64 },
}

impl DelayPolicy {
    pub fn fixed(delay: f64) -> Self {
        DelayPolicy::Fixed { delay: delay.max(0.0) }
    }

    pub fn exponential(initial_delay: f64, rate: f64) -> Self {
        DelayPolicy::Exponential {
            delay: initial_delay.max(0.0),
            rate: rate.max(1.0),
        }
    }

    pub fn exp_then_fixed(initial_delay: f64, final_delay: f64, exp_steps: u32, rate: f64) -> Self {
        DelayPolicy::ExpThenFixed {
            delay: initial_delay.max(0.0),
            final_delay: final_delay.max(0.0),
            remaining_exp_steps: exp_steps,
            rate: rate.max(1.0),
        }
    }

    pub fn fixed_then_exp(initial_delay: f64, initial_exp_delay: f64, fixed_steps: u32, rate: f64) -> Self {
        DelayPolicy::FixedThenExp {
            delay: initial_delay.max(0.0),
            initial_exp_delay: initial_exp_delay.max(0.0),
            remaining_fixed_steps: fixed_steps,
            rate: rate.max(1.0),
        }
    }

    /// The delay that should be waited out before the attempt this policy
    /// currently describes.
    pub fn current_delay(&self) -> f64 {
        match *self {
            DelayPolicy::Fixed { delay } => delay,
            DelayPolicy::Exponential { delay, .. } => delay,
            DelayPolicy::ExpThenFixed { delay, .. } => delay,
            DelayPolicy::FixedThenExp { delay, .. } => delay,
        }
    }

    /// Returns the policy for the *next* failure, after this one's delay has
    /// been waited out once.
    pub fn advance(self) -> DelayPolicy {
        match self {
            DelayPolicy::Fixed { delay } => DelayPolicy::Fixed { delay },
            DelayPolicy::Exponential { delay, rate } => DelayPolicy::Exponential {
                delay: (delay * rate).min(MAX_FINITE_DELAY_SECS),
                rate,
            },
            DelayPolicy::ExpThenFixed { delay, final_delay, remaining_exp_steps, rate } => {
                if remaining_exp_steps > 0 {
                    DelayPolicy::ExpThenFixed {
                        delay: (delay * rate).min(MAX_FINITE_DELAY_SECS),
                        final_delay,
                        remaining_exp_steps: remaining_exp_steps - 1,
                        rate,
                    }
                } else {
                    DelayPolicy::Fixed { delay: final_delay }
                }
            }
            DelayPolicy::FixedThenExp { delay, initial_exp_delay, remaining_fixed_steps, rate } => {
                if remaining_fixed_steps > 0 {
                    DelayPolicy::FixedThenExp {
                        delay,
                        initial_exp_delay,
                        remaining_fixed_steps: remaining_fixed_steps - 1,
                        rate,
                    }
                } else {
                    DelayPolicy::Exponential { delay: initial_exp_delay, rate }
                }
            }
        }
    }
}

/// Governs whether a failed attempt should retry, and, if so, what
/// [`DelayPolicy`] state to wait out first.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RetryPolicy {
    Never,
    Count { remaining: u32, delay: DelayPolicy },
    Infinite { delay: DelayPolicy },
}

impl RetryPolicy {
    pub fn never() -> Self {
        RetryPolicy::Never
    }

    /// `count(0, _)` is equivalent to [`RetryPolicy::Never`], per spec.
    pub fn count(attempts: u32, delay: DelayPolicy) -> Self {
        if attempts == 0 {
            RetryPolicy::Never
        } else {
            RetryPolicy::Count { remaining: attempts, delay }
        }
    }

    pub fn infinite(delay: DelayPolicy) -> Self {
        RetryPolicy::Infinite { delay }
    }

    pub fn should_retry(&self) -> bool {
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::Count { remaining, .. } => *remaining > 0,
            RetryPolicy::Infinite { .. } => true,
        }
    }

    /// The delay to wait out before the next attempt. Meaningless (and `0`)
    /// when [`Self::should_retry`] is `false`.
    pub fn next_delay(&self) -> f64 {
        match self {
            RetryPolicy::Never => 0.0,
            RetryPolicy::Count { delay, .. } => delay.current_delay(),
            RetryPolicy::Infinite { delay } => delay.current_delay(),
        }
    }

    /// Consumes one retry attempt (if any) and advances the delay policy.
    pub fn advance(self) -> RetryPolicy {
        match self {
            RetryPolicy::Never => RetryPolicy::Never,
            RetryPolicy::Count { remaining, delay } => {
                if remaining == 0 {
                    RetryPolicy::Count { remaining, delay }
                } else {
                    RetryPolicy::Count { remaining: remaining - 1, delay: delay.advance() }
                }
            }
            RetryPolicy::Infinite { delay } => RetryPolicy::Infinite { delay: delay.advance() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_does_not_retry() {
        let policy = RetryPolicy::never();
        assert!(!policy.should_retry());
    }

    #[test]
    fn count_zero_is_equivalent_to_never() {
        let policy = RetryPolicy::count(0, DelayPolicy::fixed(1.0));
        assert_eq!(policy, RetryPolicy::Never);
    }

    #[test]
    fn count_exhausts_after_n_advances() {
        let mut policy = RetryPolicy::count(2, DelayPolicy::fixed(0.01));
        assert!(policy.should_retry());
        policy = policy.advance();
        assert!(policy.should_retry());
        policy = policy.advance();
        assert!(!policy.should_retry());
    }

    #[test]
    fn infinite_never_exhausts() {
        let mut policy = RetryPolicy::infinite(DelayPolicy::fixed(0.01));
        for _ in 0..1000 {
            assert!(policy.should_retry());
            policy = policy.advance();
        }
    }

    #[test]
    fn exponential_delay_grows_and_clamps_to_max() {
        let mut delay = DelayPolicy::exponential(1.0, 2.0);
        assert_eq!(delay.current_delay(), 1.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 2.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 4.0);

        let mut huge = DelayPolicy::exponential(MAX_FINITE_DELAY_SECS, 10.0);
        huge = huge.advance();
        assert_eq!(huge.current_delay(), MAX_FINITE_DELAY_SECS);
    }

    #[test]
    fn rate_below_one_is_clamped_to_one() {
        let delay = DelayPolicy::exponential(5.0, 0.1);
        assert_eq!(delay.advance().current_delay(), 5.0);
    }

    #[test]
    fn exp_then_fixed_settles_after_k_steps() {
        let mut delay = DelayPolicy::exp_then_fixed(1.0, 30.0, 2, 2.0);
        assert_eq!(delay.current_delay(), 1.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 2.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 4.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 30.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 30.0);
    }

    #[test]
    fn fixed_then_exp_switches_to_exponential_after_k_steps() {
        let mut delay = DelayPolicy::fixed_then_exp(5.0, 1.0, 1, 2.0);
        assert_eq!(delay.current_delay(), 5.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 5.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 1.0);
        delay = delay.advance();
        assert_eq!(delay.current_delay(), 2.0);
    }
}
