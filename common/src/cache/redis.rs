// Redis-backed cache store

use crate::cache::CacheStore;
use crate::config::RedisConfig;
use crate::errors::StorageError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{info, instrument};

/// Cache store on top of a multiplexed Redis connection manager
#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
}

impl RedisCacheStore {
    #[instrument(skip(config), fields(redis_url = %config.url))]
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        info!("Connecting to Redis cache");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            StorageError::ConnectionFailed(format!("Invalid Redis url: {}", e))
        })?;
        let manager = ConnectionManager::new(client).await.map_err(|e| {
            StorageError::ConnectionFailed(format!("Redis connection manager: {}", e))
        })?;

        info!("Redis cache connected");
        Ok(Self { manager })
    }

    /// PING the server
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::RedisError(format!("Health check failed: {}", e)))?;

        if reply != "PONG" {
            return Err(StorageError::RedisError(format!(
                "Unexpected PING reply: {}",
                reply
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        // SET EX rejects zero
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
