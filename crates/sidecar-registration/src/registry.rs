//! Service registry backed by the local Consul agent

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use sidecar_consul_client::ConsulClient;

use crate::registration::ConsulRegistration;
use crate::ttl::TtlScheduler;

const MAINTENANCE_CHECK_PREFIX: &str = "_service_maintenance:";

/// Status of a registered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Up,
    OutOfService,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStatus::Up => write!(f, "UP"),
            RegistrationStatus::OutOfService => write!(f, "OUT_OF_SERVICE"),
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(RegistrationStatus::Up),
            "OUT_OF_SERVICE" => Ok(RegistrationStatus::OutOfService),
            other => Err(anyhow::anyhow!(
                "unknown status: {}, expected UP or OUT_OF_SERVICE",
                other
            )),
        }
    }
}

/// Registry the sidecar submits its registration to
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, registration: &ConsulRegistration) -> anyhow::Result<()>;

    async fn deregister(&self, registration: &ConsulRegistration) -> anyhow::Result<()>;

    async fn set_status(
        &self,
        registration: &ConsulRegistration,
        status: RegistrationStatus,
    ) -> anyhow::Result<()>;

    async fn get_status(&self, registration: &ConsulRegistration)
    -> anyhow::Result<RegistrationStatus>;
}

pub struct ConsulServiceRegistry {
    client: ConsulClient,
    ttl_scheduler: Option<Arc<TtlScheduler>>,
}

impl ConsulServiceRegistry {
    pub fn new(client: ConsulClient, ttl_scheduler: Option<Arc<TtlScheduler>>) -> Self {
        Self {
            client,
            ttl_scheduler,
        }
    }
}

#[async_trait]
impl ServiceRegistry for ConsulServiceRegistry {
    async fn register(&self, registration: &ConsulRegistration) -> anyhow::Result<()> {
        let discovery = registration.discovery();
        if !discovery.register {
            info!(
                service_id = registration.instance_id(),
                "Registration disabled, skipping"
            );
            return Ok(());
        }

        info!(
            service_id = registration.instance_id(),
            service_name = registration.service_name(),
            "Registering service with consul"
        );

        match self.client.agent_service_register(registration.service()).await {
            Ok(()) => {
                if registration.uses_ttl()
                    && let Some(scheduler) = &self.ttl_scheduler
                {
                    scheduler.add(registration.instance_id());
                }
                Ok(())
            }
            Err(e) if discovery.fail_fast => Err(anyhow::Error::new(e).context(format!(
                "failed to register service '{}'",
                registration.instance_id()
            ))),
            Err(e) => {
                warn!(
                    service_id = registration.instance_id(),
                    "Fail fast is disabled. Error registering service with consul: {}", e
                );
                Ok(())
            }
        }
    }

    async fn deregister(&self, registration: &ConsulRegistration) -> anyhow::Result<()> {
        if let Some(scheduler) = &self.ttl_scheduler {
            scheduler.remove(registration.instance_id());
        }
        if !registration.discovery().deregister {
            info!(
                service_id = registration.instance_id(),
                "Deregistration disabled, skipping"
            );
            return Ok(());
        }

        info!(
            service_id = registration.instance_id(),
            "Deregistering service with consul"
        );
        self.client
            .agent_service_deregister(registration.instance_id())
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        registration: &ConsulRegistration,
        status: RegistrationStatus,
    ) -> anyhow::Result<()> {
        let enable = status == RegistrationStatus::OutOfService;
        self.client
            .agent_service_set_maintenance(registration.instance_id(), enable, None)
            .await?;
        info!(
            service_id = registration.instance_id(),
            %status,
            "Updated service status"
        );
        Ok(())
    }

    async fn get_status(
        &self,
        registration: &ConsulRegistration,
    ) -> anyhow::Result<RegistrationStatus> {
        let checks = self
            .client
            .health_checks_for_service(registration.service_name())
            .await?;

        let in_maintenance = checks.iter().any(|check| {
            check.service_id == registration.instance_id()
                && check.check_id.starts_with(MAINTENANCE_CHECK_PREFIX)
        });

        Ok(if in_maintenance {
            RegistrationStatus::OutOfService
        } else {
            RegistrationStatus::Up
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{DiscoveryProperties, HeartbeatProperties};
    use serde_json::json;
    use sidecar_consul_client::{ConsulClientConfig, NewService, ServiceCheck};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ConsulClient {
        let addr = server.address();
        ConsulClient::new(ConsulClientConfig::new(&addr.ip().to_string(), addr.port())).unwrap()
    }

    fn registration(discovery: DiscoveryProperties, ttl: bool) -> ConsulRegistration {
        let check = ServiceCheck {
            ttl: ttl.then(|| "30s".to_string()),
            http: (!ttl).then(|| "http://app:8080/health".to_string()),
            ..Default::default()
        };
        ConsulRegistration::new(
            NewService {
                id: "web-8080".to_string(),
                name: "web".to_string(),
                port: Some(8080),
                check: Some(check),
                ..Default::default()
            },
            discovery,
            HeartbeatProperties {
                enabled: ttl,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(
            "up".parse::<RegistrationStatus>().unwrap(),
            RegistrationStatus::Up
        );
        assert_eq!(
            "OUT_OF_SERVICE".parse::<RegistrationStatus>().unwrap(),
            RegistrationStatus::OutOfService
        );
        assert!("DOWN".parse::<RegistrationStatus>().is_err());
        assert_eq!(RegistrationStatus::OutOfService.to_string(), "OUT_OF_SERVICE");
    }

    #[tokio::test]
    async fn test_register_schedules_ttl_heartbeat() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/deregister/web-8080"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let scheduler = Arc::new(TtlScheduler::new(
            client_for(&server),
            Duration::from_secs(60),
        ));
        let registry = ConsulServiceRegistry::new(client_for(&server), Some(scheduler.clone()));
        let reg = registration(DiscoveryProperties::default(), true);

        registry.register(&reg).await.unwrap();
        assert!(scheduler.is_scheduled("web-8080"));

        registry.deregister(&reg).await.unwrap();
        assert!(!scheduler.is_scheduled("web-8080"));
    }

    #[tokio::test]
    async fn test_register_http_check_skips_scheduler() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let scheduler = Arc::new(TtlScheduler::new(
            client_for(&server),
            Duration::from_secs(60),
        ));
        let registry = ConsulServiceRegistry::new(client_for(&server), Some(scheduler.clone()));

        registry
            .register(&registration(DiscoveryProperties::default(), false))
            .await
            .unwrap();
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_register_failure_respects_fail_fast() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .respond_with(ResponseTemplate::new(500).set_body_string("agent down"))
            .mount(&server)
            .await;

        let registry = ConsulServiceRegistry::new(client_for(&server), None);

        let strict = registration(DiscoveryProperties::default(), false);
        assert!(registry.register(&strict).await.is_err());

        let lenient = registration(
            DiscoveryProperties {
                fail_fast: false,
                ..Default::default()
            },
            false,
        );
        assert!(registry.register(&lenient).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_and_deregister_flags() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let registry = ConsulServiceRegistry::new(client_for(&server), None);
        let reg = registration(
            DiscoveryProperties {
                register: false,
                deregister: false,
                ..Default::default()
            },
            false,
        );

        registry.register(&reg).await.unwrap();
        registry.deregister(&reg).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_status_toggles_maintenance() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/maintenance/web-8080"))
            .and(query_param("enable", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/maintenance/web-8080"))
            .and(query_param("enable", "false"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulServiceRegistry::new(client_for(&server), None);
        let reg = registration(DiscoveryProperties::default(), false);

        registry
            .set_status(&reg, RegistrationStatus::OutOfService)
            .await
            .unwrap();
        registry.set_status(&reg, RegistrationStatus::Up).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_status_reads_maintenance_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/health/checks/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"CheckID": "service:web-8080", "ServiceID": "web-8080", "Status": "passing"},
                {"CheckID": "_service_maintenance:web-8080", "ServiceID": "web-8080", "Status": "critical"}
            ])))
            .mount(&server)
            .await;

        let registry = ConsulServiceRegistry::new(client_for(&server), None);
        let status = registry
            .get_status(&registration(DiscoveryProperties::default(), false))
            .await
            .unwrap();
        assert_eq!(status, RegistrationStatus::OutOfService);
    }

    #[tokio::test]
    async fn test_get_status_up_without_maintenance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/health/checks/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"CheckID": "service:web-8080", "ServiceID": "web-8080", "Status": "passing"},
                {"CheckID": "_service_maintenance:web-9090", "ServiceID": "web-9090", "Status": "critical"}
            ])))
            .mount(&server)
            .await;

        let registry = ConsulServiceRegistry::new(client_for(&server), None);
        let status = registry
            .get_status(&registration(DiscoveryProperties::default(), false))
            .await
            .unwrap();
        assert_eq!(status, RegistrationStatus::Up);
    }
}
