// In-memory broadcast store for embedding and tests

use crate::db::store::BroadcastStore;
use crate::errors::StorageError;
use crate::models::{Scene, Subscription, SubscriptionId, TriggerType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// MemoryStore keeps scenes and subscriptions in process memory
#[derive(Default)]
pub struct MemoryStore {
    scenes: RwLock<HashMap<String, Scene>>,
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_scene(&self, scene: Scene) {
        self.scenes.write().await.insert(scene.name.clone(), scene);
    }

    pub async fn upsert_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }

    pub async fn remove_subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        self.subscriptions.write().await.remove(&id)
    }
}

#[async_trait]
impl BroadcastStore for MemoryStore {
    async fn find_scene(&self, name: &str) -> Result<Option<Scene>, StorageError> {
        Ok(self.scenes.read().await.get(name).cloned())
    }

    async fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn find_enabled_by_scene(
        &self,
        scene_name: &str,
    ) -> Result<Vec<Subscription>, StorageError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.enabled && s.scene_name == scene_name)
            .cloned()
            .collect())
    }

    async fn find_enabled_cron(&self) -> Result<Vec<Subscription>, StorageError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.enabled && s.trigger_type == TriggerType::Cron)
            .cloned()
            .collect())
    }

    async fn update_last_triggered(
        &self,
        id: SubscriptionId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if let Some(sub) = self.subscriptions.write().await.get_mut(&id) {
            sub.last_triggered_at = Some(at);
        }
        Ok(())
    }

    async fn update_next_trigger(
        &self,
        id: SubscriptionId,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        if let Some(sub) = self.subscriptions.write().await.get_mut(&id) {
            sub.next_trigger_at = at;
        }
        Ok(())
    }
}
