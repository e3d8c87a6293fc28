// Time source used by the scheduler, retry backoff and in-memory cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Clock abstracts wall-clock reads and sleeping
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Production clock: system time and tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock anchored to tokio's monotonic time
///
/// `now()` is the wall-clock time at construction plus the tokio time elapsed
/// since then, so under `tokio::time::pause()` both reads and sleeps follow
/// `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall_anchor: DateTime<Utc>,
    instant_anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            wall_anchor: Utc::now(),
            instant_anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.instant_anchor);
        self.wall_anchor
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let start = clock.now();

        tokio::time::advance(Duration::from_secs(301)).await;

        let elapsed = clock.now() - start;
        assert_eq!(elapsed.num_seconds(), 301);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleep_advances_now() {
        let clock = TokioClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(60)).await;

        assert!((clock.now() - start).num_seconds() >= 60);
    }

    #[test]
    fn test_system_clock_is_close_to_utc_now() {
        let clock = SystemClock;
        let delta = (Utc::now() - clock.now()).num_seconds().abs();
        assert!(delta < 2);
    }
}
