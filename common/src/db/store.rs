// Read/write contract the engine needs from the persistent store

use crate::errors::StorageError;
use crate::models::{Scene, Subscription, SubscriptionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// BroadcastStore is the narrow persistence contract of the engine
///
/// Scenes and subscriptions are created and edited elsewhere; the engine
/// only reads them and maintains the two trigger timestamps.
#[async_trait]
pub trait BroadcastStore: Send + Sync {
    async fn find_scene(&self, name: &str) -> Result<Option<Scene>, StorageError>;

    async fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError>;

    /// Enabled subscriptions referencing `scene_name`
    async fn find_enabled_by_scene(
        &self,
        scene_name: &str,
    ) -> Result<Vec<Subscription>, StorageError>;

    /// Enabled subscriptions with a `cron` trigger
    async fn find_enabled_cron(&self) -> Result<Vec<Subscription>, StorageError>;

    async fn update_last_triggered(
        &self,
        id: SubscriptionId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn update_next_trigger(
        &self,
        id: SubscriptionId,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;
}
