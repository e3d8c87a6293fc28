// Named data source handlers

use crate::errors::BoxError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// DataSource produces the current payload of a scene
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, BoxError>;
}

/// Any zero-argument async closure is a data source
#[async_trait]
impl<F, Fut> DataSource for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    async fn fetch(&self) -> Result<Value, BoxError> {
        (self)().await
    }
}

/// Registry of data sources keyed by handler name
#[derive(Default)]
pub struct DataSourceRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn DataSource>>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under `name`, replacing any previous handler
    pub async fn register(&self, name: impl Into<String>, source: Arc<dyn DataSource>) {
        let name = name.into();
        let replaced = self
            .handlers
            .write()
            .await
            .insert(name.clone(), source)
            .is_some();
        info!(handler = %name, replaced = replaced, "Registered data source handler");
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.handlers.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
