// Error handling framework for the scene broadcast engine

use crate::models::SubscriptionId;
use thiserror::Error;

/// Boxed error returned by data source handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration-level problems the caller is expected to handle
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    #[error("Scene is disabled: {0}")]
    SceneDisabled(String),

    #[error("No data source handler registered under '{0}'")]
    HandlerNotRegistered(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Subscription is disabled: {0}")]
    SubscriptionDisabled(SubscriptionId),

    #[error("Subscription {0} has no cron expression")]
    MissingCronExpression(SubscriptionId),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },
}

/// A registered data source handler failed
#[derive(Error, Debug)]
#[error("Data source '{handler}' failed: {source}")]
pub struct DataSourceError {
    pub handler: String,
    #[source]
    pub source: BoxError,
}

/// Persistent store and cache store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

/// A single subscription could not be scheduled during initialization
#[derive(Error, Debug)]
#[error("Failed to schedule subscription {subscription_id}: {reason}")]
pub struct SchedulingError {
    pub subscription_id: SubscriptionId,
    pub reason: String,
}

/// Umbrella error for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// True when the error is a configuration problem rather than an infrastructure one
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

/// API response error type for the administrative surface
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(err: ConfigurationError) -> Self {
        let code = match err {
            ConfigurationError::SceneNotFound(_) | ConfigurationError::SubscriptionNotFound(_) => {
                "NOT_FOUND"
            }
            _ => "CONFIGURATION_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<DataSourceError> for ApiError {
    fn from(err: DataSourceError) -> Self {
        ApiError::new("DATA_SOURCE_ERROR", err.to_string())
            .with_details(serde_json::json!({ "handler": err.handler }))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::new("STORAGE_ERROR", err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Configuration(e) => e.into(),
            EngineError::DataSource(e) => e.into(),
            EngineError::Storage(e) => e.into(),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StorageError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::DatabaseError(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::RedisError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidJson(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_cron_display() {
        let err = ConfigurationError::InvalidCronExpression {
            expression: "* * *".to_string(),
            reason: "expected 5 or 6 fields, found 3".to_string(),
        };
        assert!(err.to_string().contains("Invalid cron expression '* * *'"));
    }

    #[test]
    fn test_data_source_error_keeps_source() {
        let err = DataSourceError {
            handler: "weibo".to_string(),
            source: "upstream returned 502".into(),
        };
        assert!(err.to_string().contains("weibo"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_not_found_maps_to_not_found_code() {
        let api_err: ApiError = ConfigurationError::SubscriptionNotFound(7).into();
        assert_eq!(api_err.code, "NOT_FOUND");

        let api_err: ApiError = EngineError::from(ConfigurationError::SceneDisabled("x".into())).into();
        assert_eq!(api_err.code, "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_data_source_error_to_api_error_has_details() {
        let err = DataSourceError {
            handler: "zhihu".to_string(),
            source: "boom".into(),
        };
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, "DATA_SOURCE_ERROR");
        assert_eq!(api_err.details, Some(serde_json::json!({ "handler": "zhihu" })));
    }

    #[test]
    fn test_engine_error_is_configuration() {
        let err: EngineError = ConfigurationError::HandlerNotRegistered("h".into()).into();
        assert!(err.is_configuration());
        let err: EngineError = StorageError::RedisError("down".into()).into();
        assert!(!err.is_configuration());
    }
}
