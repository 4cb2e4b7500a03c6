// src/resilience/retry.rs - Exponential backoff with jitter
use std::time::Duration;

use rand::Rng;

use crate::price_feed::types::FeedError;

/// Retry schedule for transient provider failures: up to `max_attempts`
/// calls, sleeping `2^attempt` seconds plus jitter between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub jitter_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::RETRY_MAX_ATTEMPTS,
            jitter_max_ms: crate::constants::RETRY_JITTER_MAX_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = Duration::from_secs(1u64 << attempt.min(16));
        let jitter = if self.jitter_max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..self.jitter_max_ms))
        };
        base + jitter
    }

    /// Only transient failures are retried; deterministic rejections
    /// surface immediately.
    pub fn should_retry(&self, error: &FeedError, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts && error.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 3,
            jitter_max_ms: 0,
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_under_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 3,
            jitter_max_ms: 1_000,
        };
        for _ in 0..50 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(3));
        }
    }

    #[test]
    fn retries_stop_at_the_attempt_cap() {
        let policy = RetryPolicy {
            max_attempts: 3,
            jitter_max_ms: 0,
        };
        let transient = FeedError::MalformedPayload("truncated".into());
        assert!(policy.should_retry(&transient, 0));
        assert!(policy.should_retry(&transient, 1));
        assert!(!policy.should_retry(&transient, 2));
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let unsupported = FeedError::Unsupported {
            symbol: "NEOBTC".into(),
            provider: "Kraken".into(),
        };
        assert!(!policy.should_retry(&unsupported, 0));
    }
}
