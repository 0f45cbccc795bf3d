//! Sliding-window rate limiter.
//!
//! Allows at most `max_per_window` acquisitions in any window of length
//! `window`. When the budget is spent, [`RateLimiter::try_acquire`] reports how
//! long until the oldest acquisition leaves the window so callers can defer
//! work instead of rejecting it.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of the limiter configuration and remaining budget.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub max_per_window: u32,
    pub window_ms: u64,
    pub available: u32,
}

/// Sliding-window rate limiter.
///
/// Not internally synchronized; the queue keeps it inside its state lock.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    granted: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_per_window` acquisitions per `window`.
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            granted: VecDeque::new(),
        }
    }

    /// Try to take one slot at `now`.
    ///
    /// Returns `Err(wait)` with the time until a slot frees up when the budget
    /// for the current window is spent.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.evict_expired(now);

        if (self.granted.len() as u32) < self.max_per_window {
            self.granted.push_back(now);
            return Ok(());
        }

        match self.granted.front() {
            Some(oldest) => Err((*oldest + self.window).saturating_duration_since(now)),
            None => Ok(()),
        }
    }

    /// Earliest instant at which a slot is available.
    pub fn next_available(&mut self, now: Instant) -> Instant {
        self.evict_expired(now);
        if (self.granted.len() as u32) < self.max_per_window {
            return now;
        }
        self.granted
            .front()
            .map(|oldest| *oldest + self.window)
            .unwrap_or(now)
    }

    /// Remaining slots in the current window.
    pub fn available(&mut self, now: Instant) -> u32 {
        self.evict_expired(now);
        self.max_per_window
            .saturating_sub(self.granted.len() as u32)
    }

    pub fn status(&mut self, now: Instant) -> RateLimitStatus {
        RateLimitStatus {
            max_per_window: self.max_per_window,
            window_ms: self.window.as_millis() as u64,
            available: self.available(now),
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.granted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.granted.pop_front();
            } else {
                break;
            }
        }
    }
}
