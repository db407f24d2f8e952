//! Registration resolution
//!
//! Turns the sidecar, discovery and heartbeat settings into a single
//! [`ConsulRegistration`]. No I/O happens here; submitting the registration
//! is the registry's job.

use tracing::{debug, info};

use sidecar_common::{Result, has_text};
use sidecar_consul_client::{NewService, ServiceCheck};

use crate::naming::{app_name, create_tags, instance_id, normalize_for_dns};
use crate::properties::{DiscoveryProperties, HeartbeatProperties, SidecarProperties};
use crate::registration::{ConsulRegistration, RegistrationCustomizer, customize};

/// Host name to register, first non-empty of:
/// 1. `sidecar.hostname`
/// 2. the environment override (`consul.instance.hostname` / `CONSUL_INSTANCE_HOSTNAME`)
/// 3. the discovery-derived host name
pub fn resolve_hostname(
    sidecar: &SidecarProperties,
    env_hostname_override: &str,
    discovery: &DiscoveryProperties,
) -> String {
    if let Some(hostname) = sidecar.hostname.as_deref().filter(|h| has_text(Some(h))) {
        return hostname.to_string();
    }
    if has_text(Some(env_hostname_override)) {
        return env_hostname_override.to_string();
    }
    discovery.derived_hostname(sidecar.ip_address.as_deref())
}

/// Build the registration for the co-located application
///
/// A check is attached exactly when `sidecar.port` is set; an address is set
/// exactly when the discovery settings do not prefer the agent's address.
/// Customizers run last, in order.
pub fn resolve_registration(
    sidecar: &SidecarProperties,
    discovery: &DiscoveryProperties,
    heartbeat: &HeartbeatProperties,
    env_hostname_override: &str,
    customizers: &[Box<dyn RegistrationCustomizer>],
) -> Result<ConsulRegistration> {
    sidecar.validate()?;

    let hostname = resolve_hostname(sidecar, env_hostname_override, discovery);
    let app_name = app_name(discovery);

    let mut service = NewService {
        id: instance_id(discovery, &app_name, sidecar.port)?,
        name: normalize_for_dns(&app_name)?,
        tags: create_tags(discovery),
        ..Default::default()
    };

    if !discovery.prefer_agent_address {
        service.address = Some(hostname.clone());
    }

    if let Some(port) = sidecar.port {
        service.port = Some(port);
        service.check = Some(create_check(port, &hostname, sidecar, discovery, heartbeat));
    } else {
        debug!(
            service_id = %service.id,
            "No sidecar port configured, registering without a health check"
        );
    }

    let mut registration = ConsulRegistration::new(service, discovery.clone(), heartbeat.clone());
    customize(customizers, &mut registration)?;

    info!(
        service_id = registration.instance_id(),
        service_name = registration.service_name(),
        address = ?registration.service().address,
        port = ?registration.service().port,
        "Resolved sidecar registration"
    );
    Ok(registration)
}

/// Check for a service with a known port
///
/// TTL when heartbeats are enabled, otherwise an HTTP check against the first
/// of: sidecar health URI, sidecar home page URI, discovery health check URL,
/// `{scheme}://{hostname}:{port}{health_check_path}`.
fn create_check(
    port: u16,
    hostname: &str,
    sidecar: &SidecarProperties,
    discovery: &DiscoveryProperties,
    heartbeat: &HeartbeatProperties,
) -> ServiceCheck {
    let mut check = ServiceCheck::default();

    if let Some(timeout) = discovery
        .health_check_critical_timeout
        .as_deref()
        .filter(|t| has_text(Some(t)))
    {
        check.deregister_critical_service_after = Some(timeout.to_string());
    }

    if heartbeat.enabled {
        check.ttl = Some(heartbeat.ttl());
        return check;
    }

    let target = sidecar
        .health_uri
        .as_ref()
        .or(sidecar.home_page_uri.as_ref())
        .map(|uri| uri.to_string())
        .or_else(|| {
            discovery
                .health_check_url
                .clone()
                .filter(|url| has_text(Some(url)))
        })
        .unwrap_or_else(|| {
            format!(
                "{}://{}:{}{}",
                discovery.scheme, hostname, port, discovery.health_check_path
            )
        });

    check.http = Some(target);
    check.header = discovery.health_check_headers.clone();
    check.interval = Some(discovery.health_check_interval.clone());
    check.timeout = discovery.health_check_timeout.clone();
    check.tls_skip_verify = discovery.health_check_tls_skip_verify;
    check
}
