//! HTTP client for the local Consul agent
//!
//! Covers the agent and health endpoints the sidecar needs to register,
//! heartbeat, put into maintenance and look up service instances.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::error::{ConsulClientError, Result};
use crate::model::{HealthCheck, NewService, ServiceHealth};

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Configuration for the Consul agent client
#[derive(Clone, Debug)]
pub struct ConsulClientConfig {
    /// Agent host name or address
    pub host: String,
    /// Agent HTTP port
    pub port: u16,
    /// "http" or "https"
    pub scheme: String,
    /// ACL token sent with every request
    pub acl_token: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ConsulClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8500,
            scheme: "http".to_string(),
            acl_token: None,
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
        }
    }
}

impl ConsulClientConfig {
    /// Create a new config for a single agent
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// Set the scheme used to reach the agent
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Set the ACL token
    pub fn with_acl_token(mut self, token: Option<String>) -> Self {
        self.acl_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Set timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }

    /// Base URL of the agent, e.g. `http://localhost:8500/`
    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}:{}/",
            self.scheme, self.host, self.port
        ))?)
    }
}

/// Client for the Consul agent HTTP API
#[derive(Clone, Debug)]
pub struct ConsulClient {
    client: Client,
    base_url: Url,
    acl_token: Option<String>,
}

impl ConsulClient {
    /// Create a new client
    pub fn new(config: ConsulClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;
        let base_url = config.base_url()?;

        Ok(Self {
            client,
            base_url,
            acl_token: config.acl_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments; each segment is percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConsulClientError::CannotBeABase(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_token(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.acl_token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }

    /// Register a service with the local agent
    /// PUT /v1/agent/service/register
    pub async fn agent_service_register(&self, service: &NewService) -> Result<()> {
        let url = self.url(&["v1", "agent", "service", "register"])?;
        debug!(service_id = %service.id, %url, "Registering service with agent");

        let response = self
            .with_token(self.client.put(url).json(service))
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Remove a service from the local agent
    /// PUT /v1/agent/service/deregister/:service_id
    pub async fn agent_service_deregister(&self, service_id: &str) -> Result<()> {
        let url = self.url(&["v1", "agent", "service", "deregister", service_id])?;
        debug!(service_id, "Deregistering service from agent");

        let response = self.with_token(self.client.put(url)).send().await?;
        Self::check_status(response).await
    }

    /// Mark a TTL check as passing
    /// PUT /v1/agent/check/pass/:check_id
    pub async fn agent_check_pass(&self, check_id: &str, note: Option<&str>) -> Result<()> {
        let url = self.url(&["v1", "agent", "check", "pass", check_id])?;

        let mut builder = self.client.put(url);
        if let Some(note) = note {
            builder = builder.query(&[("note", note)]);
        }
        let response = self.with_token(builder).send().await?;
        Self::check_status(response).await
    }

    /// Toggle maintenance mode for a service
    /// PUT /v1/agent/service/maintenance/:service_id?enable=..&reason=..
    pub async fn agent_service_set_maintenance(
        &self,
        service_id: &str,
        enable: bool,
        reason: Option<&str>,
    ) -> Result<()> {
        let url = self.url(&["v1", "agent", "service", "maintenance", service_id])?;

        let mut query = vec![("enable", enable.to_string())];
        if let Some(reason) = reason {
            query.push(("reason", reason.to_string()));
        }
        let response = self
            .with_token(self.client.put(url).query(&query))
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// List instances of a service with their health
    /// GET /v1/health/service/:service
    pub async fn health_services(
        &self,
        service_name: &str,
        passing_only: bool,
    ) -> Result<Vec<ServiceHealth>> {
        let url = self.url(&["v1", "health", "service", service_name])?;

        let mut builder = self.client.get(url);
        if passing_only {
            builder = builder.query(&[("passing", "true")]);
        }
        let response = self.with_token(builder).send().await?;
        Self::json(response).await
    }

    /// List the checks associated with a service
    /// GET /v1/health/checks/:service
    pub async fn health_checks_for_service(&self, service_name: &str) -> Result<Vec<HealthCheck>> {
        let url = self.url(&["v1", "health", "checks", service_name])?;

        let response = self.with_token(self.client.get(url)).send().await?;
        Self::json(response).await
    }

    async fn check_status(response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        error!("Agent request failed with status {}: {}", status, message);
        Err(ConsulClientError::Agent {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = response.text().await.unwrap_or_default();
        error!("Agent request failed with status {}: {}", status, message);
        Err(ConsulClientError::Agent {
            status: status.as_u16(),
            message,
        })
    }
}
