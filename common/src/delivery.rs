// Delivery engine: bounded retries with exponential backoff around a Pusher

use crate::clock::Clock;
use crate::models::{DeliveryResult, PushTarget};
use crate::push::Pusher;
use crate::retry::RetryStrategy;
use crate::telemetry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// DeliveryEngine retries failed pushes with backoff
pub struct DeliveryEngine {
    pusher: Arc<dyn Pusher>,
    strategy: Arc<dyn RetryStrategy>,
    clock: Arc<dyn Clock>,
}

impl DeliveryEngine {
    pub fn new(
        pusher: Arc<dyn Pusher>,
        strategy: Arc<dyn RetryStrategy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pusher,
            strategy,
            clock,
        }
    }

    /// Push with up to `max_retries` additional attempts
    ///
    /// Attempts run strictly in sequence; attempt 0 fires immediately and
    /// each later attempt waits `strategy.delay_before(attempt)` first. The
    /// first successful result is returned, otherwise the last failure.
    #[instrument(skip(self, payload, template), fields(url = %target.url, max_retries = max_retries))]
    pub async fn push_with_retry(
        &self,
        target: &PushTarget,
        payload: &Value,
        template: Option<&str>,
        timeout: Duration,
        max_retries: u32,
    ) -> DeliveryResult {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = self.strategy.delay_before(attempt);
                debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                self.clock.sleep(delay).await;
            }

            let result = self.pusher.push(target, payload, template, timeout).await;
            telemetry::record_delivery_attempt(target.target_type.as_str(), result.ok);

            if result.ok {
                if attempt > 0 {
                    info!(attempt = attempt, status = result.status, "Push succeeded after retry");
                }
                return result;
            }

            if attempt >= max_retries {
                warn!(
                    attempts = attempt + 1,
                    status = result.status,
                    "Push failed after all attempts"
                );
                return result;
            }

            debug!(attempt = attempt, status = result.status, "Push attempt failed");
            attempt += 1;
        }
    }
}
