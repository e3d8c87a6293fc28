// Scene data cache: resolves a scene to its payload, caching per scene TTL

use crate::cache::CacheStore;
use crate::config::{CacheConfig, CacheOutagePolicy};
use crate::db::BroadcastStore;
use crate::errors::{ConfigurationError, DataSourceError, EngineError, StorageError};
use crate::models::Scene;
use crate::scene::registry::{DataSource, DataSourceRegistry};
use crate::telemetry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// SceneDataCache owns the handler registry and the cache client
pub struct SceneDataCache {
    store: Arc<dyn BroadcastStore>,
    cache: Arc<dyn CacheStore>,
    registry: DataSourceRegistry,
    key_prefix: String,
    outage_policy: CacheOutagePolicy,
}

impl SceneDataCache {
    pub fn new(
        store: Arc<dyn BroadcastStore>,
        cache: Arc<dyn CacheStore>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            registry: DataSourceRegistry::new(),
            key_prefix: config.key_prefix.clone(),
            outage_policy: config.outage_policy,
        }
    }

    pub fn cache_key(&self, scene_name: &str) -> String {
        format!("{}{}", self.key_prefix, scene_name)
    }

    /// Register `handler` under `name`; re-registration replaces
    pub async fn register_data_source_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn DataSource>,
    ) {
        self.registry.register(name, handler).await;
    }

    /// Current payload of an enabled scene
    ///
    /// Scenes with a positive TTL are served from the cache while the entry
    /// lives. Handler failures are never cached.
    #[instrument(skip(self), fields(scene = %scene_name))]
    pub async fn fetch_scene_data(&self, scene_name: &str) -> Result<Value, EngineError> {
        let scene = self.load_enabled_scene(scene_name).await?;
        let ttl = scene.cache_ttl();
        let key = self.cache_key(&scene.name);

        if ttl.is_some() {
            let cached = self.read_cached(&key).await?;
            telemetry::record_cache_lookup(&scene.name, cached.is_some());
            if let Some(payload) = cached {
                debug!("Scene cache hit");
                return Ok(payload);
            }
            debug!("Scene cache miss");
        }

        let handler = self
            .registry
            .get(&scene.handler)
            .await
            .ok_or_else(|| ConfigurationError::HandlerNotRegistered(scene.handler.clone()))?;

        let payload = handler.fetch().await.map_err(|source| {
            warn!(handler = %scene.handler, error = %source, "Data source handler failed");
            DataSourceError {
                handler: scene.handler.clone(),
                source,
            }
        })?;

        if let Some(ttl) = ttl {
            self.write_cached(&key, &payload, ttl).await?;
        }

        Ok(payload)
    }

    /// Evict the cached payload of `scene_name`; absent entries are fine
    #[instrument(skip(self), fields(scene = %scene_name))]
    pub async fn clear_scene_cache(&self, scene_name: &str) -> Result<(), StorageError> {
        self.cache.delete(&self.cache_key(scene_name)).await?;
        debug!("Scene cache cleared");
        Ok(())
    }

    async fn load_enabled_scene(&self, scene_name: &str) -> Result<Scene, EngineError> {
        let scene = self
            .store
            .find_scene(scene_name)
            .await?
            .ok_or_else(|| ConfigurationError::SceneNotFound(scene_name.to_string()))?;

        if !scene.enabled {
            return Err(ConfigurationError::SceneDisabled(scene.name).into());
        }
        Ok(scene)
    }

    async fn read_cached(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw,
            Err(e) => return self.on_outage(e, key).map(|_| None),
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unparseable cache entry");
                Ok(None)
            }
        }
    }

    async fn write_cached(
        &self,
        key: &str,
        payload: &Value,
        ttl: std::time::Duration,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(payload)?;
        match self.cache.set(key, &raw, ttl).await {
            Ok(()) => Ok(()),
            Err(e) => self.on_outage(e, key),
        }
    }

    fn on_outage(&self, err: StorageError, key: &str) -> Result<(), StorageError> {
        match self.outage_policy {
            CacheOutagePolicy::Degrade => {
                warn!(key = %key, error = %err, "Cache store unavailable, bypassing cache");
                Ok(())
            }
            CacheOutagePolicy::Fail => Err(err),
        }
    }
}
