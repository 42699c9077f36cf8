use crate::core::{Bounds, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behavior for remote reads. Remote writes are never retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff to wait after the given failed attempt (1-based), doubling up to the cap.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Store configuration
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tallystore::StoreConfig;
///
/// let config = StoreConfig::new()
///     .bounds(-100, 100)
///     .quiet_period(Duration::from_millis(150));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Inclusive range the counter value must stay inside
    pub bounds: Bounds,

    /// Debounce interval before a pending snapshot is persisted
    pub quiet_period: Duration,

    /// Upper bound on every single remote call
    pub remote_timeout: Duration,

    /// Retry policy for remote reads
    pub read_retry: RetryPolicy,

    /// Cache key holding the counter snapshot
    pub counter_key: String,

    /// Cache key holding the session statistics
    pub session_key: String,

    /// Capacity of the notice broadcast channel
    pub notice_capacity: usize,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            bounds: Bounds::default(),
            quiet_period: Duration::from_millis(300),
            remote_timeout: Duration::from_secs(3),
            read_retry: RetryPolicy::default(),
            counter_key: "counter".to_string(),
            session_key: "session".to_string(),
            notice_capacity: 64,
        }
    }

    /// Set value bounds. Invalid bounds are reported by `validate`.
    pub fn bounds(mut self, min: i64, max: i64) -> Self {
        self.bounds = Bounds::unchecked(min, max);
        self
    }

    /// Set the debounce quiet period
    pub fn quiet_period(mut self, period: Duration) -> Self {
        self.quiet_period = period;
        self
    }

    /// Set remote call timeout
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Set remote read retry policy
    pub fn read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Set the cache key prefix; the counter and session keys derive from it
    pub fn key_prefix(mut self, prefix: &str) -> Self {
        self.counter_key = format!("{}_counter", prefix);
        self.session_key = format!("{}_session", prefix);
        self
    }

    pub fn validate(&self) -> Result<()> {
        Bounds::new(self.bounds.min(), self.bounds.max())?;
        if self.quiet_period.is_zero() {
            return Err(StoreError::InvalidConfig(
                "quiet_period must be greater than zero".to_string(),
            ));
        }
        if self.remote_timeout.is_zero() {
            return Err(StoreError::InvalidConfig(
                "remote_timeout must be greater than zero".to_string(),
            ));
        }
        if self.read_retry.max_attempts == 0 {
            return Err(StoreError::InvalidConfig(
                "read_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.counter_key == self.session_key {
            return Err(StoreError::InvalidConfig(
                "counter_key and session_key must differ".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quiet_period, Duration::from_millis(300));
        assert_eq!(config.bounds.max(), 999_999);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(StoreConfig::new().bounds(5, 10).validate().is_err());
        assert!(StoreConfig::new()
            .quiet_period(Duration::ZERO)
            .validate()
            .is_err());
        assert!(StoreConfig::new()
            .remote_timeout(Duration::ZERO)
            .validate()
            .is_err());

        let mut policy = RetryPolicy::default();
        policy.max_attempts = 0;
        assert!(StoreConfig::new().read_retry(policy).validate().is_err());
    }

    #[test]
    fn key_prefix_derives_both_keys() {
        let config = StoreConfig::new().key_prefix("demo");
        assert_eq!(config.counter_key, "demo_counter");
        assert_eq!(config.session_key, "demo_session");
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(350));
    }
}
