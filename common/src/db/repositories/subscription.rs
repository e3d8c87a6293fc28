// PostgreSQL implementation of the broadcast store

use crate::db::store::BroadcastStore;
use crate::db::DbPool;
use crate::errors::StorageError;
use crate::models::{
    parse_target_auth, parse_template, parse_trigger_config, Scene, Subscription, SubscriptionId,
    TargetType, TriggerType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{instrument, warn};

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, scene_name, name, target_type, target_url, target_auth,
    trigger_type, trigger_config, template, enabled, retry_count,
    timeout_seconds, created_by, last_triggered_at, next_trigger_at,
    created_at, updated_at
"#;

/// Repository for scene and subscription rows
pub struct PgBroadcastStore {
    pool: DbPool,
}

impl PgBroadcastStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn scene_from_row(row: &PgRow) -> Result<Scene, StorageError> {
        let cache_ttl: i32 = row.try_get("cache_ttl")?;
        Ok(Scene {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            handler: row.try_get("handler")?,
            cache_ttl: cache_ttl.max(0) as u64,
            enabled: row.try_get("enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn subscription_from_row(row: &PgRow) -> Result<Subscription, StorageError> {
        let id: i64 = row.try_get("id")?;

        let raw_target_type: String = row.try_get("target_type")?;
        let target_type = raw_target_type.parse::<TargetType>().unwrap_or_else(|e| {
            warn!(subscription_id = id, error = %e, "Falling back to webhook target type");
            TargetType::Webhook
        });

        let raw_trigger_type: String = row.try_get("trigger_type")?;
        let trigger_type = raw_trigger_type.parse::<TriggerType>().unwrap_or_else(|e| {
            warn!(subscription_id = id, error = %e, "Falling back to manual trigger type");
            TriggerType::Manual
        });

        let target_auth: Option<String> = row.try_get("target_auth")?;
        let trigger_config: Option<String> = row.try_get("trigger_config")?;
        let template: Option<String> = row.try_get("template")?;
        let retry_count: i32 = row.try_get("retry_count")?;
        let timeout_seconds: i32 = row.try_get("timeout_seconds")?;

        Ok(Subscription {
            id,
            scene_name: row.try_get("scene_name")?,
            name: row.try_get("name")?,
            target_type,
            target_url: row.try_get("target_url")?,
            target_auth: parse_target_auth(target_auth.as_deref()),
            trigger_type,
            trigger_config: parse_trigger_config(trigger_config.as_deref()),
            template: parse_template(template.as_deref()),
            enabled: row.try_get("enabled")?,
            retry_count: retry_count.max(0) as u32,
            timeout_seconds: timeout_seconds.max(0) as u64,
            created_by: row.try_get("created_by")?,
            last_triggered_at: row.try_get("last_triggered_at")?,
            next_trigger_at: row.try_get("next_trigger_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn subscriptions_from_rows(rows: &[PgRow]) -> Result<Vec<Subscription>, StorageError> {
        rows.iter().map(Self::subscription_from_row).collect()
    }
}

#[async_trait]
impl BroadcastStore for PgBroadcastStore {
    #[instrument(skip(self))]
    async fn find_scene(&self, name: &str) -> Result<Option<Scene>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT name, description, handler, cache_ttl, enabled, created_at, updated_at
            FROM scenes
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(Self::scene_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError> {
        let sql = format!("SELECT {} FROM subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        row.as_ref().map(Self::subscription_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn find_enabled_by_scene(
        &self,
        scene_name: &str,
    ) -> Result<Vec<Subscription>, StorageError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE scene_name = $1 AND enabled = true ORDER BY id",
            SUBSCRIPTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(scene_name)
            .fetch_all(self.pool.pool())
            .await?;

        let subscriptions = Self::subscriptions_from_rows(&rows)?;
        tracing::debug!(count = subscriptions.len(), "Loaded scene subscribers");
        Ok(subscriptions)
    }

    #[instrument(skip(self))]
    async fn find_enabled_cron(&self) -> Result<Vec<Subscription>, StorageError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE trigger_type = 'cron' AND enabled = true ORDER BY id",
            SUBSCRIPTION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool.pool()).await?;

        Self::subscriptions_from_rows(&rows)
    }

    #[instrument(skip(self))]
    async fn update_last_triggered(
        &self,
        id: SubscriptionId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE subscriptions SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_next_trigger(
        &self,
        id: SubscriptionId,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE subscriptions SET next_trigger_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool.pool())
            .await?;
        Ok(())
    }
}
