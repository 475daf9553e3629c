//! Retry policy.
//!
//! The policy is a plain decision function: given the error just observed,
//! how many attempts have been made and how long the campaign has run, it
//! says whether to try again and after what delay. The executor composes it
//! explicitly around each network call.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the delay, then try again.
    Retry(Duration),
    /// Surface the error.
    GiveUp,
}

/// Exponential backoff with a give-up predicate.
///
/// Delays are `initial_delay * multiplier^(attempt - 1)`, capped at
/// `max_delay`. There is no jitter, so delays strictly increase until the cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed, first try included.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Growth factor between delays. Values below 1, and NaN, count as 1.
    pub multiplier: f64,
    /// Cap on a single delay.
    pub max_delay: Duration,
    /// Ceiling on time spent including the next delay.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_RETRY_ATTEMPTS,
            initial_delay: crate::config::DEFAULT_RETRY_INITIAL_DELAY,
            multiplier: 2.0,
            max_delay: crate::config::DEFAULT_RETRY_MAX_DELAY,
            max_elapsed: crate::config::DEFAULT_MAX_RETRY_ELAPSED,
        }
    }
}

impl RetryPolicy {
    /// Policy matching a client configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            initial_delay: config.retry_initial_delay,
            max_delay: config.retry_max_delay,
            max_elapsed: config.max_retry_elapsed,
            ..Self::default()
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Decide what to do after `attempt` attempts failed with `error`,
    /// `elapsed` after the first one started.
    #[must_use]
    pub fn decide(&self, error: &ClientError, attempt: u32, elapsed: Duration) -> RetryDecision {
        if error.is_permanent() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = self.delay_for(attempt);
        if elapsed.saturating_add(delay) > self.max_elapsed {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(delay)
    }
}
