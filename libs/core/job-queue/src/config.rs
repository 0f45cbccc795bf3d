//! Queue configuration
//!
//! `QueueConfig` bundles the drain, rate limit and retry settings of a
//! [`JobQueue`](crate::JobQueue). Values come from builder methods or from the
//! environment via [`FromEnv`].

use core_config::{env_parse, ConfigError, FromEnv};
use serde::Serialize;
use std::time::Duration;

/// Backoff strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// base * 2^(attempt - 1)
    Exponential,
    /// base * attempt
    Linear,
    /// base
    Fixed,
}

/// Retry policy applied to retryable failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts have failed so far.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let n = failed_attempts.max(1);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = match self.backoff {
            Backoff::Exponential => base_ms.saturating_mul(2u64.saturating_pow(n - 1)),
            Backoff::Linear => base_ms.saturating_mul(n as u64),
            Backoff::Fixed => base_ms,
        };
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Configuration for a job queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Name used in logs and metric labels
    pub name: String,

    /// Maximum jobs started per rate window
    pub rate_limit: u32,

    /// Length of the sliding rate window
    pub rate_window: Duration,

    /// Fallback wake-up interval for the drain loop
    pub poll_interval: Duration,

    /// Upper bound for a single processor call
    pub job_timeout: Duration,

    pub retry: RetryPolicy,
}

impl QueueConfig {
    /// Create a config with defaults and the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate_limit: 10,
            rate_window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the rate limit (`max` jobs per `window`)
    pub fn with_rate_limit(mut self, max: u32, window: Duration) -> Self {
        self.rate_limit = max.max(1);
        self.rate_window = window;
        self
    }

    /// Set the fallback poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("jobs")
    }
}

impl FromEnv for QueueConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = RetryPolicy::default();
        let max_attempts: u32 = env_parse("EMAIL_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "EMAIL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(env_parse("EMAIL_RETRY_BASE_MS", 1000u64)?),
            max_delay: Duration::from_millis(env_parse("EMAIL_RETRY_MAX_MS", 60_000u64)?),
            backoff: Backoff::Exponential,
        };

        Ok(Self::new("email")
            .with_rate_limit(
                env_parse("EMAIL_RATE_LIMIT", 10u32)?,
                Duration::from_secs(env_parse("EMAIL_RATE_WINDOW_SECS", 60u64)?),
            )
            .with_poll_interval(Duration::from_millis(env_parse(
                "EMAIL_POLL_INTERVAL_MS",
                1000u64,
            )?))
            .with_job_timeout(Duration::from_secs(env_parse("EMAIL_JOB_TIMEOUT_SECS", 30u64)?))
            .with_retry(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential,
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(60), Duration::from_secs(30));
    }

    #[test]
    fn test_linear_and_fixed_backoff() {
        let linear = RetryPolicy {
            backoff: Backoff::Linear,
            ..RetryPolicy::default()
        };
        assert_eq!(linear.delay_for(3), Duration::from_secs(3));

        let fixed = RetryPolicy {
            backoff: Backoff::Fixed,
            ..RetryPolicy::default()
        };
        assert_eq!(fixed.delay_for(5), Duration::from_secs(1));
    }

    #[test]
    fn test_allows_another() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_another(0));
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));
    }

    #[test]
    fn test_builder_pattern() {
        let config = QueueConfig::new("email")
            .with_rate_limit(0, Duration::from_secs(1))
            .with_job_timeout(Duration::from_secs(5));

        assert_eq!(config.name, "email");
        assert_eq!(config.rate_limit, 1);
        assert_eq!(config.job_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("EMAIL_RATE_LIMIT", Some("30")),
                ("EMAIL_RATE_WINDOW_SECS", Some("10")),
                ("EMAIL_MAX_ATTEMPTS", Some("5")),
                ("EMAIL_RETRY_BASE_MS", None),
            ],
            || {
                let config = QueueConfig::from_env().unwrap();
                assert_eq!(config.rate_limit, 30);
                assert_eq!(config.rate_window, Duration::from_secs(10));
                assert_eq!(config.retry.max_attempts, 5);
                assert_eq!(config.retry.base_delay, Duration::from_secs(1));
            },
        );
    }

    #[test]
    fn test_from_env_rejects_zero_attempts() {
        temp_env::with_var("EMAIL_MAX_ATTEMPTS", Some("0"), || {
            assert!(QueueConfig::from_env().is_err());
        });
    }
}
