// HTTP push adapter: one delivery attempt with a hard timeout

use crate::models::{DeliveryResult, PushTarget, TargetAuth};
use crate::push::envelope::wrap_payload;
use crate::push::template::apply_template;
use crate::push::Pusher;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// HttpPusher POSTs JSON payloads to push targets
#[derive(Debug, Clone)]
pub struct HttpPusher {
    client: Client,
}

impl HttpPusher {
    /// Create a new HttpPusher with a fresh reqwest client
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("fsf-scheduler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Build the final request body for a target
    pub fn prepare_body(target: &PushTarget, payload: &Value, template: Option<&str>) -> Value {
        let templated = match template {
            Some(template) => apply_template(template, payload),
            None => payload.clone(),
        };
        wrap_payload(target.target_type, templated)
    }

    /// Request headers for a target
    ///
    /// Custom auth headers replace any preset header of the same name.
    pub fn build_headers(auth: &Option<TargetAuth>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match auth {
            Some(TargetAuth::Bearer { token }) => {
                match HeaderValue::from_str(&format!("Bearer {}", token)) {
                    Ok(value) => {
                        headers.insert(AUTHORIZATION, value);
                    }
                    Err(e) => warn!(error = %e, "Skipping invalid bearer token"),
                }
            }
            Some(TargetAuth::Custom { headers: custom }) => {
                for (key, value) in custom {
                    let name = HeaderName::from_bytes(key.as_bytes());
                    let value = HeaderValue::from_str(value);
                    match (name, value) {
                        (Ok(name), Ok(value)) => {
                            headers.insert(name, value);
                        }
                        _ => warn!(header = %key, "Skipping invalid custom header"),
                    }
                }
            }
            None => {}
        }
        headers
    }

    async fn send(&self, target: &PushTarget, body: String) -> Result<(u16, String), String> {
        let request = self
            .client
            .post(&target.url)
            .headers(Self::build_headers(&target.auth))
            .body(body);

        let response = request
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read response body: {}", e));
        Ok((status, text))
    }
}

#[async_trait]
impl Pusher for HttpPusher {
    #[tracing::instrument(skip(self, payload, template), fields(target_type = %target.target_type, url = %target.url))]
    async fn push(
        &self,
        target: &PushTarget,
        payload: &Value,
        template: Option<&str>,
        timeout: Duration,
    ) -> DeliveryResult {
        let body = Self::prepare_body(target, payload, template);
        let body = match serde_json::to_string(&body) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryResult::transport_failure(
                    format!("Failed to serialize payload: {}", e),
                    Duration::ZERO,
                )
            }
        };
        debug!(body_len = body.len(), "Sending push request");

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.send(target, body)).await;
        let duration = started.elapsed();

        match outcome {
            Ok(Ok((status, text))) => {
                let ok = (200..300).contains(&status);
                if !ok {
                    warn!(status = status, "Push target returned non-success status");
                }
                DeliveryResult {
                    ok,
                    status,
                    body: text,
                    duration,
                }
            }
            Ok(Err(message)) => {
                warn!(error = %message, "Push request failed");
                DeliveryResult::transport_failure(message, duration)
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Push request timed out");
                DeliveryResult::transport_failure(
                    format!("Request timed out after {}ms", timeout.as_millis()),
                    duration,
                )
            }
        }
    }
}
