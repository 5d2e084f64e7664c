//! Reconnection backoff policy.
//!
//! Exponential backoff with factor 1.5, a hard 30 s cap, and up to 1 s of
//! uniform jitter to avoid synchronized retry storms.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::time::Duration;

const BACKOFF_FACTOR: f64 = 1.5;
const MAX_DELAY_MS: u64 = 30_000;
const JITTER_MS: u64 = 1_000;

/// Computes retry delays for the reconnect path.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay_ms: u64,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_attempts,
        }
    }

    /// Whether another attempt is allowed. Attempts are 1-based.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Deterministic part of the delay: `base * 1.5^(attempt-1)`, capped.
    ///
    /// Kept separate from the jitter so the monotonic-with-cap property
    /// is directly testable.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self.base_delay_ms as f64 * BACKOFF_FACTOR.powi(exponent as i32);
        let capped = delay.min(MAX_DELAY_MS as f64);
        Duration::from_millis(capped as u64)
    }

    /// Full delay for a retry: deterministic backoff plus uniform jitter.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let mut rng = SmallRng::from_entropy();
        let jitter = Duration::from_millis(rng.gen_range(0..JITTER_MS));
        self.base_delay(attempt) + jitter
    }
}
