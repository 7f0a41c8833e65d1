//! Consecutive-failure bookkeeping shared by endpoints and providers.
//!
//! # States
//! - Closed: failures below threshold, attempts pass through
//! - Open: failures at/above threshold and the window has not elapsed
//! - Half-Open: window elapsed, next attempt decides (success resets)
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= max_failures
//! Open → Half-Open: now - last_failure >= window
//! Half-Open → Closed: attempt succeeds (counter reset)
//! Half-Open → Open: attempt fails (last_failure restamped)
//! ```

use std::time::{Duration, Instant};

/// Failure counter plus the time of the most recent failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffState {
    /// Consecutive failures since the last success or reset.
    pub consecutive_failures: u32,
    /// When the most recent failure was recorded.
    pub last_failure: Option<Instant>,
}

impl BackoffState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure at `now`, returning the new consecutive count.
    pub fn record_failure(&mut self, now: Instant) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
        self.consecutive_failures
    }

    /// Record a success: the counter goes straight back to zero.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    /// Manual operator reset.
    pub fn reset(&mut self) {
        self.record_success();
    }

    /// Remaining time in the open window, if the breaker is open at `now`.
    ///
    /// Open iff `consecutive_failures >= max_failures` and
    /// `now - last_failure < window`.
    pub fn remaining_cooldown(
        &self,
        max_failures: u32,
        window: Duration,
        now: Instant,
    ) -> Option<Duration> {
        if self.consecutive_failures < max_failures {
            return None;
        }
        let last = self.last_failure?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < window {
            Some(window - elapsed)
        } else {
            None
        }
    }

    /// True while the breaker is open.
    pub fn in_cooldown(&self, max_failures: u32, window: Duration, now: Instant) -> bool {
        self.remaining_cooldown(max_failures, window, now).is_some()
    }

    /// Instant at which the current open window closes.
    pub fn cooldown_expires_at(
        &self,
        max_failures: u32,
        window: Duration,
        now: Instant,
    ) -> Option<Instant> {
        self.remaining_cooldown(max_failures, window, now)
            .map(|remaining| now + remaining)
    }
}
