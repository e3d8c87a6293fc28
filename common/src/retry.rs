// Retry strategy with exponential backoff and optional jitter

use rand::Rng;
use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default upper bound for any single backoff delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Retry strategy trait for calculating retry delays
pub trait RetryStrategy: Send + Sync {
    /// Delay to wait before attempt `attempt` (0-based); attempt 0 never waits
    fn delay_before(&self, attempt: u32) -> Duration;
}

/// Exponential backoff retry strategy
/// Sequence with defaults: 1s, 2s, 4s, 8s, 10s, 10s, ...
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before attempt 1 in milliseconds
    base_delay_ms: u64,
    /// Maximum delay in milliseconds
    max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0, default: 0.0 = deterministic)
    jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: 0.0,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new exponential backoff strategy with custom values
    pub fn with_config(base_delay_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Delay without jitter: `min(base * 2^(attempt-1), max)`
    fn calculate_base_delay_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    fn add_jitter_ms(&self, base_delay_ms: u64) -> u64 {
        if self.jitter_factor == 0.0 || base_delay_ms == 0 {
            return base_delay_ms;
        }

        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;
        let jitter_ms = if jitter_range_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        } else {
            0
        };

        base_delay_ms + jitter_ms
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn delay_before(&self, attempt: u32) -> Duration {
        let base = self.calculate_base_delay_ms(attempt);
        Duration::from_millis(self.add_jitter_ms(base))
    }
}
