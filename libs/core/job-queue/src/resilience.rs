//! Circuit breaker for outbound dependencies.
//!
//! ## States
//!
//! ```text
//! ┌─────────┐  failures >= threshold  ┌────────┐
//! │ CLOSED  │ ──────────────────────> │  OPEN  │
//! └─────────┘                         └────────┘
//!      ^                                   │
//!      │                                   │ cool-down elapsed
//!      │                                   v
//!      │      success            ┌─────────────┐
//!      └──────────────────────── │ HALF-OPEN   │
//!                                └─────────────┘
//!                                      │
//!                       failure        │
//!              (back to OPEN) ─────────┘
//! ```
//!
//! While open, [`CircuitBreaker::can_execute`] returns `false` and callers fail
//! fast without touching the dependency. After the cool-down a single trial
//! call is let through; its outcome closes or re-opens the circuit.
//!
//! ## Example
//!
//! ```rust,ignore
//! use job_queue::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("smtp", CircuitBreakerConfig::default());
//!
//! if let Some(permit) = breaker.try_acquire() {
//!     match send().await {
//!         Ok(_) => permit.success(),
//!         Err(_) => permit.failure(),
//!     }
//! }
//! ```
//!
//! A [`CallPermit`] dropped without an outcome (the call timed out or was
//! cancelled) counts as a failure, so a half-open trial can never stay in
//! flight forever.

use chrono::{DateTime, Utc};
use core_config::{env_parse, ConfigError, FromEnv};
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// One trial request is allowed to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the cool-down.
    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }
}

impl FromEnv for CircuitBreakerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::default()
            .with_failure_threshold(env_parse("EMAIL_BREAKER_THRESHOLD", 5u32)?)
            .with_cool_down(Duration::from_secs(env_parse(
                "EMAIL_BREAKER_COOLDOWN_SECS",
                60u64,
            )?)))
    }
}

/// Read-only view of the breaker.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub open: bool,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub cool_down_secs: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker; `name` labels logs and metrics.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                last_failure_time: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failures since the last success or reset.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Check whether a call may proceed.
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open and
    /// admits exactly one trial call until that call is recorded.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);

                if cooled_down {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Admit one call, or `None` while the circuit is open.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        self.can_execute().then(|| CallPermit {
            breaker: self,
            recorded: false,
        })
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;

        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());
        inner.trial_in_flight = false;

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// Force the circuit closed and zero the failure counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
        info!(breaker = %self.name, "Circuit breaker manually reset");
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            open: inner.state == CircuitState::Open,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            cool_down_secs: self.config.cool_down.as_secs(),
            last_failure_time: inner.last_failure_time,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;

        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                consecutive_failures = inner.consecutive_failures,
                cool_down_secs = self.config.cool_down.as_secs(),
                "Circuit breaker OPENED"
            ),
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "Circuit breaker HALF-OPEN (testing recovery)")
            }
            CircuitState::Closed => {
                info!(breaker = %self.name, from = from.as_str(), "Circuit breaker CLOSED")
            }
        }

        counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "state" => to.as_str()
        )
        .increment(1);
    }
}

/// One admitted call. Record its outcome with [`CallPermit::success`] or
/// [`CallPermit::failure`]; dropping it unrecorded records a failure.
#[must_use = "dropping a permit records a failure"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    recorded: bool,
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.recorded = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.recorded = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            warn!(breaker = %self.breaker.name, "Call abandoned before completing, counted as failure");
            self.breaker.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cool_down: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_cool_down(cool_down),
        )
    }

    #[test]
    fn test_circuit_breaker_initial_state() {
        let breaker = breaker(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
        assert!(!breaker.snapshot().open);
    }

    #[test]
    fn test_circuit_breaker_opens_at_threshold() {
        let breaker = breaker(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());

        let snapshot = breaker.snapshot();
        assert!(snapshot.open);
        assert_eq!(snapshot.consecutive_failures, 3);
        assert!(snapshot.last_failure_time.is_some());
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = breaker(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_allows_single_trial() {
        let breaker = breaker(1, Duration::ZERO);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Trial still in flight
        assert!(!breaker.can_execute());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let breaker = breaker(1, Duration::ZERO);

        breaker.record_failure();
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_permit_records_outcome() {
        let breaker = breaker(3, Duration::from_secs(60));

        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.failure_count(), 1);

        breaker.try_acquire().unwrap().success();
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_dropped_permit_counts_as_failure() {
        let breaker = breaker(3, Duration::from_secs(60));

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_dropped_half_open_trial_reopens() {
        let breaker = breaker(1, Duration::ZERO);
        breaker.record_failure();

        let trial = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        drop(trial);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 2);
        // Cool-down of zero admits the next trial straight away
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_reset_closes_circuit() {
        let breaker = breaker(2, Duration::from_secs(3600));
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.can_execute());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("EMAIL_BREAKER_THRESHOLD", Some("3")),
                ("EMAIL_BREAKER_COOLDOWN_SECS", Some("15")),
            ],
            || {
                let config = CircuitBreakerConfig::from_env().unwrap();
                assert_eq!(config.failure_threshold, 3);
                assert_eq!(config.cool_down, Duration::from_secs(15));
            },
        );
    }
}
