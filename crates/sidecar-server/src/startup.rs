//! Sidecar startup and shutdown flow

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use tracing::{error, info, warn};

use sidecar_consul_client::ConsulClient;
use sidecar_registration::{
    ConsulRegistration, ConsulServiceRegistry, RegistrationCustomizer, ServiceRegistry,
    TtlScheduler, resolve_registration,
};

use crate::config::Configuration;
use crate::controller::{SidecarState, routes};
use crate::health::LocalApplicationHealthIndicator;
use crate::shutdown::wait_for_shutdown_signal;

/// Everything the sidecar needs once configuration has been resolved
pub struct Sidecar {
    registration: ConsulRegistration,
    registry: Arc<dyn ServiceRegistry>,
    client: ConsulClient,
    health: LocalApplicationHealthIndicator,
    discovery_enabled: bool,
}

impl Sidecar {
    /// Resolve the registration and build the registry
    ///
    /// Returns `None` when `spring.cloud.consul.sidecar.enabled` is false.
    pub fn prepare(
        configuration: &Configuration,
        customizers: &[Box<dyn RegistrationCustomizer>],
    ) -> anyhow::Result<Option<Self>> {
        if !configuration.sidecar_enabled() {
            return Ok(None);
        }

        let sidecar = configuration.sidecar_properties()?;
        let discovery = configuration.discovery_properties()?;
        let heartbeat = configuration.heartbeat_properties()?;
        let env_hostname_override = configuration.env_hostname_override();

        let registration = resolve_registration(
            &sidecar,
            &discovery,
            &heartbeat,
            &env_hostname_override,
            customizers,
        )
        .context("failed to resolve sidecar registration")?;

        let client = ConsulClient::new(configuration.consul_client_config(&discovery)?)
            .context("failed to create consul client")?;

        let ttl_scheduler = if heartbeat.enabled {
            Some(Arc::new(TtlScheduler::new(
                client.clone(),
                heartbeat.heartbeat_interval()?,
            )))
        } else {
            None
        };
        let registry: Arc<dyn ServiceRegistry> =
            Arc::new(ConsulServiceRegistry::new(client.clone(), ttl_scheduler));

        let health = LocalApplicationHealthIndicator::new(sidecar.health_uri.clone())?;

        Ok(Some(Self {
            registration,
            registry,
            client,
            health,
            discovery_enabled: discovery.enabled,
        }))
    }

    pub fn registration(&self) -> &ConsulRegistration {
        &self.registration
    }

    pub fn registry(&self) -> &dyn ServiceRegistry {
        self.registry.as_ref()
    }

    pub async fn register(&self) -> anyhow::Result<()> {
        if !self.discovery_enabled {
            info!("Consul discovery disabled, not registering");
            return Ok(());
        }
        self.registry.register(&self.registration).await
    }

    pub async fn deregister(&self) -> anyhow::Result<()> {
        if !self.discovery_enabled {
            return Ok(());
        }
        self.registry.deregister(&self.registration).await
    }

    /// Route state for the HTTP endpoints
    pub fn state(&self) -> SidecarState {
        SidecarState {
            app_name: self.registration.service_name().to_string(),
            health: self.health.clone(),
            client: self.client.clone(),
        }
    }
}

/// Register the application, serve the sidecar endpoints until a shutdown
/// signal arrives, then deregister.
pub async fn run(
    configuration: Configuration,
    customizers: Vec<Box<dyn RegistrationCustomizer>>,
) -> anyhow::Result<()> {
    let Some(sidecar) = Sidecar::prepare(&configuration, &customizers)? else {
        info!("Consul sidecar disabled, nothing to do");
        return Ok(());
    };

    let address = configuration.server_address();
    let port = configuration.server_port()?;
    let state = web::Data::new(sidecar.state());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .disable_signals()
    .bind((address.clone(), port))
    .with_context(|| format!("failed to bind sidecar server to {}:{}", address, port))?
    .run();
    let handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);

    info!(address = %address, port, "Consul sidecar listening");

    if let Err(e) = sidecar.register().await {
        handle.stop(true).await;
        return Err(e);
    }

    let server_result = tokio::select! {
        _ = wait_for_shutdown_signal() => None,
        result = &mut server_task => Some(result),
    };

    if let Err(e) = sidecar.deregister().await {
        error!("Failed to deregister service: {:#}", e);
    }

    match server_result {
        Some(result) => {
            warn!("Sidecar HTTP server stopped unexpectedly");
            result??;
        }
        None => {
            handle.stop(true).await;
            server_task.await??;
        }
    }

    info!("Consul sidecar stopped");
    Ok(())
}
