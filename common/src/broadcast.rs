// Broadcast and trigger orchestration over the scene cache and delivery engine

use crate::clock::Clock;
use crate::db::BroadcastStore;
use crate::delivery::DeliveryEngine;
use crate::errors::{ConfigurationError, EngineError};
use crate::models::{BroadcastSummary, DeliveryResult, Subscription, SubscriptionId};
use crate::push::template::apply_template;
use crate::scene::SceneDataCache;
use crate::telemetry;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// SubscriptionTrigger is what a scheduled tick invokes
#[async_trait]
pub trait SubscriptionTrigger: Send + Sync {
    async fn trigger(&self, id: SubscriptionId) -> Result<DeliveryResult, EngineError>;
}

/// BroadcastEngine resolves subscriptions and scenes and delivers their data
pub struct BroadcastEngine {
    store: Arc<dyn BroadcastStore>,
    scenes: Arc<SceneDataCache>,
    delivery: Arc<DeliveryEngine>,
    clock: Arc<dyn Clock>,
    default_timeout: Duration,
}

impl BroadcastEngine {
    pub fn new(
        store: Arc<dyn BroadcastStore>,
        scenes: Arc<SceneDataCache>,
        delivery: Arc<DeliveryEngine>,
        clock: Arc<dyn Clock>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            store,
            scenes,
            delivery,
            clock,
            default_timeout,
        }
    }

    pub fn scenes(&self) -> &Arc<SceneDataCache> {
        &self.scenes
    }

    /// Push the current scene data to one subscription
    ///
    /// `last_triggered_at` is stamped whatever the delivery outcome.
    #[instrument(skip(self), fields(subscription_id = id))]
    pub async fn trigger_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<DeliveryResult, EngineError> {
        let subscription = self.load_enabled_subscription(id).await?;
        let payload = self.scenes.fetch_scene_data(&subscription.scene_name).await?;

        let result = self
            .delivery
            .push_with_retry(
                &subscription.push_target(),
                &payload,
                subscription.template.as_deref(),
                subscription.timeout_or(self.default_timeout),
                subscription.retry_count,
            )
            .await;

        if let Err(e) = self.store.update_last_triggered(id, self.clock.now()).await {
            warn!(error = %e, "Failed to record last trigger time");
        }

        telemetry::record_delivery_outcome(
            &subscription.scene_name,
            result.ok,
            result.duration.as_secs_f64(),
        );
        log_delivery(&subscription, &result);

        Ok(result)
    }

    /// Deliver one fetch of the scene's data to every enabled subscriber concurrently
    ///
    /// A subscriber's failure, including a panic in its task, is counted and
    /// never aborts the others.
    #[instrument(skip(self), fields(scene = %scene_name))]
    pub async fn broadcast_to_scene(&self, scene_name: &str) -> Result<BroadcastSummary, EngineError> {
        self.store
            .find_scene(scene_name)
            .await?
            .ok_or_else(|| ConfigurationError::SceneNotFound(scene_name.to_string()))?;

        let subscriptions = self.store.find_enabled_by_scene(scene_name).await?;
        if subscriptions.is_empty() {
            info!("Scene has no enabled subscribers");
            return Ok(BroadcastSummary::default());
        }

        let payload = Arc::new(self.scenes.fetch_scene_data(scene_name).await?);
        let total = subscriptions.len();

        let mut tasks = JoinSet::new();
        for subscription in subscriptions {
            let delivery = self.delivery.clone();
            let store = self.store.clone();
            let clock = self.clock.clone();
            let payload = payload.clone();
            let timeout = subscription.timeout_or(self.default_timeout);

            tasks.spawn(async move {
                let result = delivery
                    .push_with_retry(
                        &subscription.push_target(),
                        &payload,
                        subscription.template.as_deref(),
                        timeout,
                        subscription.retry_count,
                    )
                    .await;

                if result.ok {
                    if let Err(e) = store
                        .update_last_triggered(subscription.id, clock.now())
                        .await
                    {
                        warn!(subscription_id = subscription.id, error = %e, "Failed to record last trigger time");
                    }
                }

                telemetry::record_delivery_outcome(
                    &subscription.scene_name,
                    result.ok,
                    result.duration.as_secs_f64(),
                );
                log_delivery(&subscription, &result);
                result.ok
            });
        }

        let mut success = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => success += 1,
                Ok(false) => {}
                Err(e) => error!(error = %e, "Broadcast delivery task aborted"),
            }
        }

        let summary = BroadcastSummary {
            total,
            success,
            failed: total - success,
        };
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            "Broadcast finished"
        );
        Ok(summary)
    }

    /// Scene data shaped by the subscription's template, without pushing
    #[instrument(skip(self), fields(subscription_id = id))]
    pub async fn pull_subscription(&self, id: SubscriptionId) -> Result<Value, EngineError> {
        let subscription = self.load_enabled_subscription(id).await?;
        let payload = self.scenes.fetch_scene_data(&subscription.scene_name).await?;

        Ok(match subscription.template.as_deref() {
            Some(template) => apply_template(template, &payload),
            None => payload,
        })
    }

    async fn load_enabled_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Subscription, EngineError> {
        let subscription = self
            .store
            .find_subscription(id)
            .await?
            .ok_or(ConfigurationError::SubscriptionNotFound(id))?;

        if !subscription.enabled {
            return Err(ConfigurationError::SubscriptionDisabled(id).into());
        }
        Ok(subscription)
    }
}

#[async_trait]
impl SubscriptionTrigger for BroadcastEngine {
    async fn trigger(&self, id: SubscriptionId) -> Result<DeliveryResult, EngineError> {
        self.trigger_subscription(id).await
    }
}

fn log_delivery(subscription: &Subscription, result: &DeliveryResult) {
    let duration_ms = result.duration.as_millis() as u64;
    if result.ok {
        info!(
            subscription_id = subscription.id,
            scene = %subscription.scene_name,
            status = result.status,
            duration_ms = duration_ms,
            "Delivered scene data"
        );
    } else {
        warn!(
            subscription_id = subscription.id,
            scene = %subscription.scene_name,
            status = result.status,
            duration_ms = duration_ms,
            body = %result.body,
            "Delivery failed"
        );
    }
}
