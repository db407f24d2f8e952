//! Sidecar, discovery and heartbeat settings
//!
//! Each struct deserializes from its configuration section using kebab-case
//! keys (`sidecar.health-uri`, `spring.cloud.consul.discovery.prefer-agent-address`, ...).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use sidecar_common::{Result, SidecarError, has_text, local_hostname, local_ip};

/// Settings describing the co-located application
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SidecarProperties {
    /// Port the application listens on
    pub port: Option<u16>,
    /// Host name to register, overrides every other source
    pub hostname: Option<String>,
    /// Address of the application; replaces the discovery IP when set
    pub ip_address: Option<String>,
    /// Application health endpoint
    pub health_uri: Option<Url>,
    /// Application home page
    pub home_page_uri: Option<Url>,
}

impl SidecarProperties {
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(SidecarError::InvalidProperty {
                key: "sidecar.port".to_string(),
                message: "port must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Consul discovery settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiscoveryProperties {
    pub enabled: bool,
    /// Explicit service name; falls back to `application_name`
    pub service_name: Option<String>,
    /// Value of `spring.application.name`, filled in by the configuration loader
    pub application_name: Option<String>,
    /// Explicit instance id; derived from the app name and port when unset
    pub instance_id: Option<String>,
    pub tags: Vec<String>,
    pub instance_zone: Option<String>,
    pub instance_group: Option<String>,
    pub default_zone_metadata_name: String,
    /// Scheme the application is served on ("http" or "https")
    pub scheme: String,
    /// Local host name; looked up from the OS when unset
    pub hostname: Option<String>,
    /// Local address; first non-loopback IPv4 when unset
    pub ip_address: Option<String>,
    pub prefer_ip_address: bool,
    /// Leave the address empty and let the agent report its own
    pub prefer_agent_address: bool,
    pub health_check_path: String,
    pub health_check_url: Option<String>,
    pub health_check_interval: String,
    pub health_check_timeout: Option<String>,
    pub health_check_critical_timeout: Option<String>,
    pub health_check_tls_skip_verify: Option<bool>,
    pub health_check_headers: HashMap<String, Vec<String>>,
    pub acl_token: Option<String>,
    /// Register with the agent on startup
    pub register: bool,
    /// Deregister from the agent on shutdown
    pub deregister: bool,
    /// Fail startup when registration fails
    pub fail_fast: bool,
}

impl Default for DiscoveryProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: None,
            application_name: None,
            instance_id: None,
            tags: Vec::new(),
            instance_zone: None,
            instance_group: None,
            default_zone_metadata_name: "zone".to_string(),
            scheme: "http".to_string(),
            hostname: None,
            ip_address: None,
            prefer_ip_address: false,
            prefer_agent_address: false,
            health_check_path: "/health".to_string(),
            health_check_url: None,
            health_check_interval: "10s".to_string(),
            health_check_timeout: None,
            health_check_critical_timeout: None,
            health_check_tls_skip_verify: None,
            health_check_headers: HashMap::new(),
            acl_token: None,
            register: true,
            deregister: true,
            fail_fast: true,
        }
    }
}

impl DiscoveryProperties {
    /// Host name the discovery layer would register on its own
    ///
    /// `ip_override` stands in for the configured IP address when present.
    pub fn derived_hostname(&self, ip_override: Option<&str>) -> String {
        if self.prefer_ip_address {
            ip_override
                .filter(|ip| has_text(Some(ip)))
                .or(self.ip_address.as_deref().filter(|ip| has_text(Some(ip))))
                .map(str::to_string)
                .unwrap_or_else(local_ip)
        } else {
            self.hostname
                .as_deref()
                .filter(|h| has_text(Some(h)))
                .map(str::to_string)
                .unwrap_or_else(local_hostname)
        }
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }
}

const MIN_TTL: Duration = Duration::from_secs(2);

/// TTL heartbeat settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HeartbeatProperties {
    pub enabled: bool,
    pub ttl_value: u64,
    /// One of "ms", "s", "m", "h"
    pub ttl_unit: String,
    /// Fraction of the TTL between two heartbeats
    pub interval_ratio: f64,
}

impl Default for HeartbeatProperties {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_value: 30,
            ttl_unit: "s".to_string(),
            interval_ratio: 2.0 / 3.0,
        }
    }
}

impl HeartbeatProperties {
    /// TTL in Consul duration syntax, e.g. "30s"
    pub fn ttl(&self) -> String {
        format!("{}{}", self.ttl_value, self.ttl_unit)
    }

    pub fn ttl_duration(&self) -> Result<Duration> {
        let value = self.ttl_value;
        let secs = match self.ttl_unit.as_str() {
            "ms" => return Ok(Duration::from_millis(value)),
            "s" => Some(value),
            "m" => value.checked_mul(60),
            "h" => value.checked_mul(3600),
            other => {
                return Err(SidecarError::InvalidProperty {
                    key: "spring.cloud.consul.discovery.heartbeat.ttl-unit".to_string(),
                    message: format!("unsupported unit '{}'", other),
                });
            }
        };
        secs.map(Duration::from_secs)
            .ok_or_else(|| SidecarError::InvalidProperty {
                key: "spring.cloud.consul.discovery.heartbeat.ttl-value".to_string(),
                message: format!("{}{} is too large", value, self.ttl_unit),
            })
    }

    /// Delay between two heartbeats
    ///
    /// `ttl * interval_ratio`, no shorter than one second and no later than
    /// one second before the TTL expires. TTLs under two seconds leave no room
    /// for that and are rejected.
    pub fn heartbeat_interval(&self) -> Result<Duration> {
        let ttl = self.ttl_duration()?;
        if ttl < MIN_TTL {
            return Err(SidecarError::InvalidProperty {
                key: "spring.cloud.consul.discovery.heartbeat.ttl-value".to_string(),
                message: format!("ttl {} is shorter than {:?}", self.ttl(), MIN_TTL),
            });
        }
        let ttl = ttl.as_secs_f64();
        let interval = (ttl * self.interval_ratio).max(1.0).min(ttl - 1.0);
        Duration::try_from_secs_f64(interval).map_err(|e| SidecarError::InvalidProperty {
            key: "spring.cloud.consul.discovery.heartbeat.ttl-value".to_string(),
            message: format!("ttl {}: {}", self.ttl(), e),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_value == 0 {
            return Err(SidecarError::InvalidProperty {
                key: "spring.cloud.consul.discovery.heartbeat.ttl-value".to_string(),
                message: "ttl must be greater than 0".to_string(),
            });
        }
        if !(self.interval_ratio > 0.0 && self.interval_ratio <= 1.0) {
            return Err(SidecarError::InvalidProperty {
                key: "spring.cloud.consul.discovery.heartbeat.interval-ratio".to_string(),
                message: format!("{} is not in (0, 1]", self.interval_ratio),
            });
        }
        self.heartbeat_interval().map(|_| ())
    }
}
