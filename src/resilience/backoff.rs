//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Retry schedule for dialing a configured peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    /// Attempts before the peer is given up on. Zero means retry forever.
    pub max_attempts: u32,
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self {
            base_ms: 250,
            max_ms: 30_000,
            max_attempts: 8,
        }
    }
}

impl DialPolicy {
    /// Delay before `attempt` (1-based). `None` once attempts are exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts != 0 && attempt > self.max_attempts {
            return None;
        }
        Some(calculate_backoff(attempt, self.base_ms, self.max_ms))
    }
}

/// Exponential delay for `attempt`, capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let delay_ms = base_ms
        .saturating_mul(2u64.saturating_pow(attempt - 1))
        .min(max_ms);

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}
