//! Exponential backoff retry policy owned by the dispatcher.
//!
//! Providers never retry internally; this policy is the single place retry
//! decisions are made.

use std::time::Duration;

/// Backoff schedule for retryable dispatch failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total dispatch attempts, including the first.
    pub max_attempts: u32,
    /// Multiplier applied per attempt.
    pub factor: u32,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            factor: 2,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = self.factor.saturating_pow(attempt.saturating_sub(1));
        let millis = u64::try_from(self.min_delay.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(exponent));
        Duration::from_millis(millis).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(5), Duration::from_secs(10), "capped");
    }
}
