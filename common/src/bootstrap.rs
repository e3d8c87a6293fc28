// Startup wiring shared by the binaries

use crate::cache::RedisCacheStore;
use crate::config::Settings;
use crate::db::repositories::PgBroadcastStore;
use crate::db::DbPool;
use crate::engine::Engine;
use crate::scene::HttpJsonSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Connect the PostgreSQL pool and apply migrations
///
/// # Errors
/// Returns error if the pool cannot connect, fails its health check or a
/// migration fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;
    db_pool
        .health_check()
        .await
        .context("Database health check failed")?;
    db_pool
        .migrate()
        .await
        .context("Failed to apply database migrations")?;

    info!("Database pool ready");
    Ok(db_pool)
}

/// Connect the Redis cache store and verify it answers PING
#[tracing::instrument(skip(settings))]
pub async fn init_cache_store(settings: &Settings) -> Result<RedisCacheStore> {
    let cache = RedisCacheStore::connect(&settings.redis)
        .await
        .context("Failed to connect Redis cache")?;
    cache
        .health_check()
        .await
        .context("Redis cache health check failed")?;

    info!("Redis cache ready");
    Ok(cache)
}

/// Build an engine backed by PostgreSQL and Redis
#[tracing::instrument(skip_all)]
pub fn build_engine(settings: &Settings, db_pool: DbPool, cache: RedisCacheStore) -> Result<Engine> {
    Engine::builder(Arc::new(PgBroadcastStore::new(db_pool)), Arc::new(cache))
        .settings(settings)?
        .build()
}

/// Register one HTTP JSON data source per `data_sources` entry
///
/// Returns the number of handlers registered.
#[tracing::instrument(skip_all)]
pub async fn register_configured_sources(engine: &Engine, settings: &Settings) -> Result<usize> {
    for source in &settings.data_sources {
        let handler = HttpJsonSource::from_config(source)
            .with_context(|| format!("Failed to build data source '{}'", source.name))?;
        engine
            .register_data_source_handler(source.name.clone(), Arc::new(handler))
            .await;
        info!(handler = %source.name, url = %source.url, "Configured data source registered");
    }
    Ok(settings.data_sources.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::clock::SystemClock;
    use crate::config::DataSourceConfig;
    use crate::db::MemoryStore;
    use crate::models::Scene;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_configured_sources_feed_scenes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hot": ["rust"]})))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.upsert_scene(Scene::new("zhihu", "zhihu_hot", 0)).await;
        let engine = Engine::builder(
            store,
            Arc::new(MemoryCacheStore::new(Arc::new(SystemClock))),
        )
        .build()
        .unwrap();

        let mut settings = Settings::default();
        settings.data_sources.push(DataSourceConfig {
            name: "zhihu_hot".to_string(),
            url: server.uri(),
            timeout_seconds: 5,
        });

        assert_eq!(register_configured_sources(&engine, &settings).await.unwrap(), 1);
        assert_eq!(
            engine.fetch_scene_data("zhihu").await.unwrap(),
            json!({"hot": ["rust"]})
        );
    }
}
