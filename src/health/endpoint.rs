//! Monitored service identity and its probe bookkeeping.

use std::time::{Duration, Instant, SystemTime};
use url::Url;

use crate::resilience::BackoffState;

/// A single monitored service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    /// Logical name used as the registry key.
    pub name: String,
    /// Human-friendly name for UIs.
    pub display_name: String,
    /// URL probed by the health check.
    pub target: Url,
    /// Monotonic time of the last real probe attempt.
    pub last_check: Option<Instant>,
    /// Wall-clock time of the last real probe attempt.
    pub last_check_at: Option<SystemTime>,
    /// Latency of the last successful probe.
    pub last_response_time: Option<Duration>,
    /// Consecutive-failure bookkeeping gating the next probe.
    pub backoff: BackoffState,
    /// Backoff window drawn when the latest failure was recorded.
    pub backoff_window: Option<Duration>,
}

impl ServiceEndpoint {
    pub fn new(name: &str, target: Url, display_name: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.unwrap_or(name).to_string(),
            target,
            last_check: None,
            last_check_at: None,
            last_response_time: None,
            backoff: BackoffState::new(),
            backoff_window: None,
        }
    }

    /// Count a failure at `now`; `window` decides the backoff for the new count.
    ///
    /// The window is drawn once here so every later gate check sees the same
    /// deadline.
    pub fn record_failure(
        &mut self,
        now: Instant,
        window: impl FnOnce(u32) -> Option<Duration>,
    ) -> u32 {
        let failures = self.backoff.record_failure(now);
        self.backoff_window = window(failures);
        failures
    }

    pub fn record_success(&mut self) {
        self.backoff.record_success();
        self.backoff_window = None;
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
        self.backoff_window = None;
    }

    /// Time left before the next probe may run, if still backing off at `now`.
    pub fn backoff_remaining(&self, max_failures: u32, now: Instant) -> Option<Duration> {
        let window = self.backoff_window?;
        self.backoff.remaining_cooldown(max_failures, window, now)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.backoff.consecutive_failures
    }
}
