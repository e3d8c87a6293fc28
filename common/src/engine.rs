// Engine facade: the entry points used by the administrative surface

use crate::broadcast::BroadcastEngine;
use crate::cache::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, DeliveryConfig, Settings};
use crate::db::BroadcastStore;
use crate::delivery::DeliveryEngine;
use crate::errors::{ConfigurationError, EngineError, StorageError};
use crate::models::{BroadcastSummary, DeliveryResult, SubscriptionId};
use crate::push::{HttpPusher, Pusher};
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::scene::{DataSource, SceneDataCache};
use crate::scheduler::ScheduleManager;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Engine owns the handler registry, the cache client and the job table
///
/// Nothing is process-global: two engines in one process are independent.
pub struct Engine {
    store: Arc<dyn BroadcastStore>,
    scenes: Arc<SceneDataCache>,
    broadcaster: Arc<BroadcastEngine>,
    scheduler: ScheduleManager,
}

impl Engine {
    pub fn builder(store: Arc<dyn BroadcastStore>, cache: Arc<dyn CacheStore>) -> EngineBuilder {
        EngineBuilder::new(store, cache)
    }

    pub async fn register_data_source_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn DataSource>,
    ) {
        self.scenes.register_data_source_handler(name, handler).await;
    }

    pub async fn fetch_scene_data(&self, scene_name: &str) -> Result<Value, EngineError> {
        self.scenes.fetch_scene_data(scene_name).await
    }

    pub async fn clear_scene_cache(&self, scene_name: &str) -> Result<(), StorageError> {
        self.scenes.clear_scene_cache(scene_name).await
    }

    pub async fn trigger_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<DeliveryResult, EngineError> {
        self.broadcaster.trigger_subscription(id).await
    }

    pub async fn broadcast_to_scene(&self, scene_name: &str) -> Result<BroadcastSummary, EngineError> {
        self.broadcaster.broadcast_to_scene(scene_name).await
    }

    pub async fn pull_subscription(&self, id: SubscriptionId) -> Result<Value, EngineError> {
        self.broadcaster.pull_subscription(id).await
    }

    pub async fn init_scheduler(&self) -> Result<usize, StorageError> {
        self.scheduler.init_scheduler().await
    }

    /// Load subscription `id` and (re)start its job
    pub async fn register_job(&self, id: SubscriptionId) -> Result<DateTime<Utc>, EngineError> {
        let subscription = self
            .store
            .find_subscription(id)
            .await?
            .ok_or(ConfigurationError::SubscriptionNotFound(id))?;
        Ok(self.scheduler.register_job(&subscription).await?)
    }

    pub async fn unregister_job(&self, id: SubscriptionId) -> bool {
        self.scheduler.unregister_job(id).await
    }

    pub async fn reload_all_jobs(&self) -> Result<usize, StorageError> {
        self.scheduler.reload_all_jobs().await
    }

    pub fn scheduler(&self) -> &ScheduleManager {
        &self.scheduler
    }

    /// A scene was edited; its cached payload is stale
    #[instrument(skip(self))]
    pub async fn on_scene_changed(&self, scene_name: &str) -> Result<(), StorageError> {
        self.scenes.clear_scene_cache(scene_name).await
    }

    /// A subscription was created or edited
    ///
    /// The job is dropped and only re-created when the stored row is still an
    /// enabled cron subscription. Returns whether a job is now scheduled.
    #[instrument(skip(self))]
    pub async fn on_subscription_changed(&self, id: SubscriptionId) -> Result<bool, EngineError> {
        self.scheduler.unregister_job(id).await;

        match self.store.find_subscription(id).await? {
            Some(subscription) if subscription.is_schedulable() => {
                self.scheduler.register_job(&subscription).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[instrument(skip(self))]
    pub async fn on_subscription_deleted(&self, id: SubscriptionId) {
        self.scheduler.unregister_job(id).await;
    }

    /// Stop every scheduled job
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        info!("Engine shut down");
    }
}

/// Builder wiring the engine's collaborators
pub struct EngineBuilder {
    store: Arc<dyn BroadcastStore>,
    cache: Arc<dyn CacheStore>,
    pusher: Option<Arc<dyn Pusher>>,
    clock: Option<Arc<dyn Clock>>,
    retry: Option<Arc<dyn RetryStrategy>>,
    cache_config: CacheConfig,
    delivery_config: DeliveryConfig,
    timezone: Tz,
}

impl EngineBuilder {
    fn new(store: Arc<dyn BroadcastStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            cache,
            pusher: None,
            clock: None,
            retry: None,
            cache_config: CacheConfig::default(),
            delivery_config: DeliveryConfig::default(),
            timezone: Tz::Asia__Shanghai,
        }
    }

    /// Take cache, delivery and scheduler settings from `settings`
    pub fn settings(mut self, settings: &Settings) -> Result<Self> {
        self.cache_config = settings.cache.clone();
        self.delivery_config = settings.delivery.clone();
        self.timezone = settings
            .scheduler
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown scheduler timezone '{}': {}", settings.scheduler.timezone, e))?;
        Ok(self)
    }

    pub fn pusher(mut self, pusher: Arc<dyn Pusher>) -> Self {
        self.pusher = Some(pusher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn retry_strategy(mut self, retry: Arc<dyn RetryStrategy>) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let pusher: Arc<dyn Pusher> = match self.pusher {
            Some(pusher) => pusher,
            None => Arc::new(HttpPusher::new().context("Failed to build HTTP client")?),
        };
        let retry: Arc<dyn RetryStrategy> = self.retry.unwrap_or_else(|| {
            Arc::new(ExponentialBackoff::with_config(
                self.delivery_config.backoff_base_ms,
                self.delivery_config.backoff_max_ms,
                self.delivery_config.backoff_jitter,
            ))
        });

        let scenes = Arc::new(SceneDataCache::new(
            self.store.clone(),
            self.cache,
            &self.cache_config,
        ));
        let delivery = Arc::new(DeliveryEngine::new(pusher, retry, clock.clone()));
        let broadcaster = Arc::new(BroadcastEngine::new(
            self.store.clone(),
            scenes.clone(),
            delivery,
            clock.clone(),
            self.delivery_config.default_timeout(),
        ));
        let scheduler = ScheduleManager::new(
            self.store.clone(),
            broadcaster.clone(),
            clock,
            self.timezone,
        );

        info!(timezone = %self.timezone, "Engine built");
        Ok(Engine {
            store: self.store,
            scenes,
            broadcaster,
            scheduler,
        })
    }
}
