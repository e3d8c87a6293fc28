// TTL-capable key-value cache stores

pub mod memory;
pub mod redis;

pub use memory::MemoryCacheStore;
pub use self::redis::RedisCacheStore;

use crate::errors::StorageError;
use async_trait::async_trait;
use std::time::Duration;

/// CacheStore holds serialized scene payloads under string keys
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` so it expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError>;

    /// Remove `key`; succeeds when the key is absent
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
