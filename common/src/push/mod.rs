// Push module: formats payloads for a channel and performs delivery attempts

pub mod envelope;
pub mod http;
pub mod template;

use crate::models::{DeliveryResult, PushTarget};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use http::HttpPusher;

/// Pusher performs exactly one delivery attempt
///
/// Implementations never fail: transport problems are reported as a
/// `DeliveryResult` with `ok == false` and status 0.
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(
        &self,
        target: &PushTarget,
        payload: &Value,
        template: Option<&str>,
        timeout: Duration,
    ) -> DeliveryResult;
}
