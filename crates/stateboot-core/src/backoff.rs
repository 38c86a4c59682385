//! Linear retry scheduling

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry budget for a step
///
/// The wait before attempt `n + 1` is `base_delay + (n - 1) * increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of invocations allowed, including the first
    pub max_attempts: u32,

    /// Wait before the second attempt
    pub base_delay: Duration,

    /// Added to the wait for every further attempt
    pub increment: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, increment: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            increment,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before the attempt following `attempt` (1-indexed), or `None`
    /// once the budget is spent
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        Some(self.base_delay + self.increment * (attempt - 1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10), Duration::from_secs(5))
    }
}
