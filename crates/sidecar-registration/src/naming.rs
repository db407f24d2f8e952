//! Naming rules for Consul registrations
//!
//! Service names and ids must be valid DNS labels; tags carry zone, group
//! and scheme information for clients.

use sidecar_common::{Result, SidecarError, has_text};

use crate::properties::DiscoveryProperties;

const SEPARATOR: char = '-';
const DEFAULT_APP_NAME: &str = "application";

/// Normalize a name into a DNS-safe label
///
/// The input must start with a letter and end with a letter or digit. Every
/// run of other characters collapses into a single hyphen.
pub fn normalize_for_dns(s: &str) -> Result<String> {
    let starts_ok = s.chars().next().is_some_and(char::is_alphabetic);
    let ends_ok = s.chars().next_back().is_some_and(char::is_alphanumeric);
    if !starts_ok || !ends_ok {
        return Err(SidecarError::InvalidServiceName(s.to_string()));
    }

    let mut normalized = String::with_capacity(s.len());
    let mut prev_separator = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            normalized.push(c);
            prev_separator = false;
        } else if !prev_separator {
            normalized.push(SEPARATOR);
            prev_separator = true;
        }
    }
    Ok(normalized)
}

/// Application name before normalization
pub fn app_name(discovery: &DiscoveryProperties) -> String {
    [&discovery.service_name, &discovery.application_name]
        .into_iter()
        .find_map(|name| name.as_deref().filter(|n| has_text(Some(n))))
        .unwrap_or(DEFAULT_APP_NAME)
        .to_string()
}

/// Instance id: the configured id, or `{app_name}:{port}`, normalized for DNS
pub fn instance_id(
    discovery: &DiscoveryProperties,
    app_name: &str,
    port: Option<u16>,
) -> Result<String> {
    match discovery.instance_id.as_deref().filter(|id| has_text(Some(id))) {
        Some(id) => normalize_for_dns(id),
        None => normalize_for_dns(&format!("{}:{}", app_name, port.unwrap_or(0))),
    }
}

/// Tags registered with the service
///
/// Configured tags first, then zone and group when set, then `secure=<bool>`
/// so clients can pick http or https.
pub fn create_tags(discovery: &DiscoveryProperties) -> Vec<String> {
    let mut tags = discovery.tags.clone();
    if let Some(zone) = discovery
        .instance_zone
        .as_deref()
        .filter(|z| has_text(Some(z)))
    {
        tags.push(format!("{}={}", discovery.default_zone_metadata_name, zone));
    }
    if let Some(group) = discovery
        .instance_group
        .as_deref()
        .filter(|g| has_text(Some(g)))
    {
        tags.push(format!("group={}", group));
    }
    tags.push(format!("secure={}", discovery.is_secure()));
    tags
}
