//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// Used for reconnect loops: `base_ms * 2^(attempt - 1)`, capped at `max_ms`,
/// plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay before a failing endpoint may be probed again.
///
/// `min(2^failures, max_secs)` seconds scaled by `1 + j`, with `j` drawn
/// uniformly from `[0, max_jitter)`.
pub fn probe_backoff_delay(failures: u32, max_secs: u64, max_jitter: f64) -> Duration {
    let jitter = if max_jitter > 0.0 {
        rand::thread_rng().gen_range(0.0..max_jitter)
    } else {
        0.0
    };
    probe_backoff_delay_with_jitter(failures, max_secs, jitter)
}

/// Deterministic core of [`probe_backoff_delay`].
pub fn probe_backoff_delay_with_jitter(failures: u32, max_secs: u64, jitter: f64) -> Duration {
    let base_secs = 2u64.saturating_pow(failures).min(max_secs);
    Duration::from_secs_f64(base_secs as f64 * (1.0 + jitter))
}
