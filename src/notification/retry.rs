use rand::Rng;
use std::time::Duration;

/// Backoff schedule for notification delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    /// 1s → 2s → 4s, plus up to 250ms jitter.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 25_000,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff_ms as f64;
        let max = self.max_backoff_ms as f64;

        // Exponential: base * 2^(attempt - 1)
        let raw_backoff = base * 2_f64.powi((attempt.max(1) as i32) - 1);
        let capped_backoff = raw_backoff.min(max);

        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };

        Duration::from_millis((capped_backoff as u64) + jitter)
    }
}
