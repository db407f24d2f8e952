//! Health of the co-located application
//!
//! The application's own health endpoint is polled on demand and its
//! `status` field is mapped onto [`HealthStatus`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Down,
    OutOfService,
    Unknown,
}

impl HealthStatus {
    fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "UP" => HealthStatus::Up,
            "DOWN" => HealthStatus::Down,
            "OUT_OF_SERVICE" => HealthStatus::OutOfService,
            _ => HealthStatus::Unknown,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Up => "UP",
            HealthStatus::Down => "DOWN",
            HealthStatus::OutOfService => "OUT_OF_SERVICE",
            HealthStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl Health {
    pub fn up() -> Self {
        Self::from_status(HealthStatus::Up)
    }

    pub fn from_status(status: HealthStatus) -> Self {
        Self {
            status,
            details: BTreeMap::new(),
        }
    }

    pub fn down(error: impl fmt::Display) -> Self {
        Self::from_status(HealthStatus::Down).with_detail("error", error.to_string())
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Polls the application's health URI, if one is configured
#[derive(Debug, Clone)]
pub struct LocalApplicationHealthIndicator {
    health_uri: Option<Url>,
    client: reqwest::Client,
}

impl LocalApplicationHealthIndicator {
    pub fn new(health_uri: Option<Url>) -> anyhow::Result<Self> {
        Self::with_timeout(health_uri, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(health_uri: Option<Url>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { health_uri, client })
    }

    pub async fn check(&self) -> Health {
        let Some(uri) = &self.health_uri else {
            return Health::up();
        };

        let body = match self.fetch(uri).await {
            Ok(body) => body,
            Err(e) => {
                warn!(health_uri = %uri, "Local application health check failed: {}", e);
                return Health::down(e);
            }
        };

        let health = match status_code(&body) {
            Some(code) => Health::from_status(HealthStatus::from_code(code)),
            None => Health::from_status(HealthStatus::Unknown)
                .with_detail("warning", "no status field in response"),
        };
        debug!(health_uri = %uri, status = %health.status, "Local application health");
        health
    }

    async fn fetch(&self, uri: &Url) -> reqwest::Result<Value> {
        self.client
            .get(uri.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

/// `status` as a string, or as an object carrying a `code`
fn status_code(body: &Value) -> Option<&str> {
    match body.get("status")? {
        Value::String(code) => Some(code.as_str()),
        Value::Object(map) => map.get("code").and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn indicator_for(server: &MockServer, body: ResponseTemplate) -> LocalApplicationHealthIndicator {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(body)
            .mount(server)
            .await;
        let uri = Url::parse(&format!("{}/health", server.uri())).unwrap();
        LocalApplicationHealthIndicator::new(Some(uri)).unwrap()
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(HealthStatus::OutOfService).unwrap(),
            json!("OUT_OF_SERVICE")
        );
        assert_eq!(
            serde_json::to_value(Health::up()).unwrap(),
            json!({"status": "UP"})
        );
        assert_eq!(HealthStatus::from_code("down"), HealthStatus::Down);
        assert_eq!(HealthStatus::from_code("STARTING"), HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_no_health_uri_is_up() {
        let indicator = LocalApplicationHealthIndicator::new(None).unwrap();
        assert_eq!(indicator.check().await, Health::up());
    }

    #[tokio::test]
    async fn test_string_status() {
        let server = MockServer::start().await;
        let indicator = indicator_for(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"status": "DOWN"})),
        )
        .await;
        assert_eq!(indicator.check().await.status, HealthStatus::Down);
    }

    #[tokio::test]
    async fn test_nested_status_code() {
        let server = MockServer::start().await;
        let indicator = indicator_for(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": {"code": "OUT_OF_SERVICE", "description": "draining"}})),
        )
        .await;
        assert_eq!(indicator.check().await.status, HealthStatus::OutOfService);
    }

    #[tokio::test]
    async fn test_missing_status_is_unknown() {
        let server = MockServer::start().await;
        let indicator = indicator_for(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"uptime": 12})),
        )
        .await;
        let health = indicator.check().await;
        assert_eq!(health.status, HealthStatus::Unknown);
        assert!(health.details.contains_key("warning"));
    }

    #[tokio::test]
    async fn test_error_response_is_down() {
        let server = MockServer::start().await;
        let indicator = indicator_for(&server, ResponseTemplate::new(500)).await;
        let health = indicator.check().await;
        assert_eq!(health.status, HealthStatus::Down);
        assert!(health.details.contains_key("error"));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_down() {
        let server = MockServer::start().await;
        let indicator =
            indicator_for(&server, ResponseTemplate::new(200).set_body_string("all good")).await;
        assert_eq!(indicator.check().await.status, HealthStatus::Down);
    }
}
