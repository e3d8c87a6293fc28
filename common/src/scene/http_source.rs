// Data source that GETs a JSON document over HTTP

use crate::config::DataSourceConfig;
use crate::errors::BoxError;
use crate::scene::registry::DataSource;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

/// HttpJsonSource returns the JSON body of a configured URL
pub struct HttpJsonSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpJsonSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("fsf-scene-source/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, url, timeout))
    }

    pub fn with_client(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DataSourceConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_seconds))
    }
}

#[async_trait]
impl DataSource for HttpJsonSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Value, BoxError> {
        let payload = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": ["a"]})))
            .expect(1)
            .mount(&server)
            .await;

        let source =
            HttpJsonSource::new(format!("{}/hot", server.uri()), Duration::from_secs(5)).unwrap();
        assert_eq!(source.fetch().await.unwrap(), json!({"items": ["a"]}));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_non_json_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let source = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(source.fetch().await.is_err());
    }
}
