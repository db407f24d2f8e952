// Consul agent API data models
// Field names follow the Consul HTTP API (PascalCase keys on the wire)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Service registration request
/// PUT /v1/agent/service/register
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewService {
    /// Service ID, unique per instance on the agent
    #[serde(rename = "ID")]
    pub id: String,

    /// Service name (DNS-safe)
    #[serde(rename = "Name")]
    pub name: String,

    /// Service tags, order preserved
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    /// Service address (omitted to let the agent report its own address)
    #[serde(rename = "Address", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Service port
    #[serde(rename = "Port", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Service metadata key-value pairs
    #[serde(rename = "Meta", default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,

    /// Enable tag override from external sources
    #[serde(
        rename = "EnableTagOverride",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_tag_override: Option<bool>,

    /// Health check definition
    #[serde(rename = "Check", default, skip_serializing_if = "Option::is_none")]
    pub check: Option<ServiceCheck>,
}

impl NewService {
    /// Check ID the agent assigns to the service's own check
    pub fn check_id(&self) -> String {
        format!("service:{}", self.id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Health check definition for service registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheck {
    /// TTL-based check duration (e.g., "30s")
    #[serde(rename = "TTL", default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    /// HTTP endpoint for HTTP checks
    #[serde(rename = "HTTP", default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,

    /// HTTP headers
    #[serde(rename = "Header", default, skip_serializing_if = "HashMap::is_empty")]
    pub header: HashMap<String, Vec<String>>,

    /// Check interval (e.g., "10s")
    #[serde(rename = "Interval", default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Check timeout (e.g., "5s")
    #[serde(rename = "Timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Deregister after critical for duration
    #[serde(
        rename = "DeregisterCriticalServiceAfter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deregister_critical_service_after: Option<String>,

    /// Skip TLS verification for HTTPS checks
    #[serde(rename = "TLSSkipVerify", default, skip_serializing_if = "Option::is_none")]
    pub tls_skip_verify: Option<bool>,

    /// Notes for the check
    #[serde(rename = "Notes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ServiceCheck {
    pub fn is_ttl(&self) -> bool {
        self.ttl.is_some()
    }
}

/// Catalog node as returned in health responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "Node", default)]
    pub node: String,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Datacenter", default)]
    pub datacenter: Option<String>,
}

/// Agent service representation (response format)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentService {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Service", default)]
    pub service: String,

    #[serde(rename = "Tags", default)]
    pub tags: Option<Vec<String>>,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Port", default)]
    pub port: u16,
}

/// Health check status entry
/// GET /v1/health/checks/:service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "Node", default)]
    pub node: String,

    #[serde(rename = "CheckID", default)]
    pub check_id: String,

    #[serde(rename = "Name", default)]
    pub name: String,

    /// One of "passing", "warning", "critical", "maintenance"
    #[serde(rename = "Status", default)]
    pub status: String,

    #[serde(rename = "Notes", default)]
    pub notes: String,

    #[serde(rename = "Output", default)]
    pub output: String,

    #[serde(rename = "ServiceID", default)]
    pub service_id: String,

    #[serde(rename = "ServiceName", default)]
    pub service_name: String,
}

/// Node, service and checks for a healthy service instance
/// GET /v1/health/service/:service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceHealth {
    #[serde(rename = "Node", default)]
    pub node: Node,

    #[serde(rename = "Service", default)]
    pub service: AgentService,

    #[serde(rename = "Checks", default)]
    pub checks: Vec<HealthCheck>,
}

impl ServiceHealth {
    /// Address clients should use: the service address, or the node's when unset
    pub fn host(&self) -> &str {
        if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        }
    }
}
