//! The registration handed to the service registry, and the hooks that can
//! adjust it before it is submitted.

use tracing::debug;

use sidecar_common::{Result, SidecarError};
use sidecar_consul_client::NewService;

use crate::properties::{DiscoveryProperties, HeartbeatProperties};

/// A service descriptor together with the settings it was built from
#[derive(Clone, Debug)]
pub struct ConsulRegistration {
    service: NewService,
    discovery: DiscoveryProperties,
    heartbeat: HeartbeatProperties,
}

impl ConsulRegistration {
    pub fn new(
        service: NewService,
        discovery: DiscoveryProperties,
        heartbeat: HeartbeatProperties,
    ) -> Self {
        Self {
            service,
            discovery,
            heartbeat,
        }
    }

    pub fn service(&self) -> &NewService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut NewService {
        &mut self.service
    }

    pub fn discovery(&self) -> &DiscoveryProperties {
        &self.discovery
    }

    pub fn heartbeat(&self) -> &HeartbeatProperties {
        &self.heartbeat
    }

    pub fn instance_id(&self) -> &str {
        &self.service.id
    }

    pub fn service_name(&self) -> &str {
        &self.service.name
    }

    /// Whether the agent expects TTL heartbeats for this service
    pub fn uses_ttl(&self) -> bool {
        self.heartbeat.enabled && self.service.check.as_ref().is_some_and(|c| c.is_ttl())
    }

    pub fn into_service(self) -> NewService {
        self.service
    }
}

/// Hook that can mutate a registration before it is returned to the caller
///
/// Customizers run in order with no isolation: each one sees the changes
/// made by the ones before it.
pub trait RegistrationCustomizer: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    fn customize(&self, registration: &mut ConsulRegistration) -> anyhow::Result<()>;
}

/// Customizer backed by a closure
pub struct FnCustomizer<F> {
    name: String,
    f: F,
}

impl<F> FnCustomizer<F>
where
    F: Fn(&mut ConsulRegistration) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> RegistrationCustomizer for FnCustomizer<F>
where
    F: Fn(&mut ConsulRegistration) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn customize(&self, registration: &mut ConsulRegistration) -> anyhow::Result<()> {
        (self.f)(registration)
    }
}

/// Apply customizers in order, stopping at the first failure
pub fn customize(
    customizers: &[Box<dyn RegistrationCustomizer>],
    registration: &mut ConsulRegistration,
) -> Result<()> {
    for customizer in customizers {
        debug!(customizer = customizer.name(), "Applying registration customizer");
        customizer
            .customize(registration)
            .map_err(|source| SidecarError::Customizer {
                name: customizer.name().to_string(),
                source,
            })?;
    }
    Ok(())
}
