use std::time::Duration;

use rand::Rng;

use crate::errors::{ProviderError, ProviderErrorKind};

/// Failure kinds worth another attempt.
pub const RETRYABLE_KINDS: [ProviderErrorKind; 5] = [
    ProviderErrorKind::Connection,
    ProviderErrorKind::RateLimit,
    ProviderErrorKind::ServiceUnavailable,
    ProviderErrorKind::Timeout,
    ProviderErrorKind::TryAgain,
];

/// Attempt limit, randomized exponential backoff and the allow-list of
/// retryable failures for remote completion calls.
///
/// The wait before retry `n` (1-based) is drawn uniformly from
/// `[0, min(max_wait, multiplier * 2^(n - 1))]`, measured in `unit`s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub max_wait: f64,
    pub unit: Duration,
    pub retry_on: Vec<ProviderErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            multiplier: 1.0,
            max_wait: 10.0,
            unit: Duration::from_secs(1),
            retry_on: RETRYABLE_KINDS.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Scale every wait; tests use milliseconds instead of seconds.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn should_retry(&self, err: &ProviderError) -> bool {
        self.retry_on.contains(&err.kind)
    }

    /// Upper bound of the wait before retry number `retry` (1-based): one unit
    /// before the first retry, doubling after that up to `max_wait`.
    pub fn max_backoff(&self, retry: u32) -> Duration {
        let exp = self.multiplier * 2f64.powi(retry.saturating_sub(1).min(62) as i32);
        self.unit.mul_f64(exp.min(self.max_wait).max(0.0))
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        let upper = self.max_backoff(retry);
        if upper.is_zero() {
            return upper;
        }
        upper.mul_f64(rand::thread_rng().gen_range(0.0..=1.0))
    }

    /// Waits between consecutive attempts, one fewer than `max_attempts`.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|retry| self.backoff(retry)).collect()
    }
}
