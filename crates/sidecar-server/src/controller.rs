//! Sidecar HTTP endpoints

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use tracing::warn;

use sidecar_consul_client::{ConsulClient, ServiceHealth};

use crate::health::{HealthStatus, LocalApplicationHealthIndicator};

/// Shared state for the sidecar routes
pub struct SidecarState {
    pub app_name: String,
    pub health: LocalApplicationHealthIndicator,
    pub client: ConsulClient,
}

/// Instance of a service as reported by `/hosts/{app_name}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub service_id: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub tags: Vec<String>,
}

impl From<&ServiceHealth> for ServiceInstance {
    fn from(entry: &ServiceHealth) -> Self {
        let tags = entry.service.tags.clone().unwrap_or_default();
        Self {
            service_id: entry.service.id.clone(),
            host: entry.host().to_string(),
            port: entry.service.port,
            secure: tags.iter().any(|t| t == "secure=true"),
            tags,
        }
    }
}

#[get("/")]
async fn index(data: web::Data<SidecarState>) -> impl Responder {
    let body = format!(
        "<html><head><title>Consul Sidecar</title></head><body>\
         <h1>Consul Sidecar for {0}</h1>\
         <ul>\
         <li><a href=\"ping\">ping</a></li>\
         <li><a href=\"health\">health</a></li>\
         <li><a href=\"hosts/{0}\">hosts/{0}</a></li>\
         </ul></body></html>",
        data.app_name
    );
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

#[get("/ping")]
async fn ping() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[get("/health")]
async fn health(data: web::Data<SidecarState>) -> impl Responder {
    let health = data.health.check().await;
    let status = match health.status {
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    HttpResponse::build(status).json(health)
}

#[get("/hosts/{app_name}")]
async fn hosts(data: web::Data<SidecarState>, path: web::Path<String>) -> impl Responder {
    let app_name = path.into_inner();
    match data.client.health_services(&app_name, true).await {
        Ok(entries) => {
            let instances: Vec<ServiceInstance> =
                entries.iter().map(ServiceInstance::from).collect();
            HttpResponse::Ok().json(instances)
        }
        Err(e) => {
            warn!(app_name = %app_name, "Failed to look up instances: {}", e);
            HttpResponse::BadGateway().json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(ping)
        .service(health)
        .service(hosts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use serde_json::json;
    use sidecar_consul_client::ConsulClientConfig;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(server: &MockServer, health_uri: Option<Url>) -> web::Data<SidecarState> {
        let addr = server.address();
        web::Data::new(SidecarState {
            app_name: "billing".to_string(),
            health: LocalApplicationHealthIndicator::new(health_uri).unwrap(),
            client: ConsulClient::new(ConsulClientConfig::new(
                &addr.ip().to_string(),
                addr.port(),
            ))
            .unwrap(),
        })
    }

    #[actix_web::test]
    async fn test_ping() {
        let server = MockServer::start().await;
        let app = test::init_service(
            App::new()
                .app_data(state_for(&server, None))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/ping").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "OK");
    }

    #[actix_web::test]
    async fn test_index_links_routes() {
        let server = MockServer::start().await;
        let app = test::init_service(
            App::new()
                .app_data(state_for(&server, None))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("hosts/billing"));
        assert!(html.contains("health"));
    }

    #[actix_web::test]
    async fn test_health_up_without_uri() {
        let server = MockServer::start().await;
        let app = test::init_service(
            App::new()
                .app_data(state_for(&server, None))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "UP");
    }

    #[actix_web::test]
    async fn test_health_down_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "DOWN"})))
            .mount(&server)
            .await;
        let uri = Url::parse(&format!("{}/app/health", server.uri())).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(&server, Some(uri)))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn test_hosts_lists_passing_instances() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/billing"))
            .and(query_param("passing", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "Node": {"Node": "node-1", "Address": "10.0.0.1"},
                    "Service": {"ID": "billing-8000", "Service": "billing", "Tags": ["v1", "secure=true"], "Address": "", "Port": 8000},
                    "Checks": []
                },
                {
                    "Node": {"Node": "node-2", "Address": "10.0.0.2"},
                    "Service": {"ID": "billing-8001", "Service": "billing", "Tags": null, "Address": "app-2", "Port": 8001},
                    "Checks": []
                }
            ])))
            .mount(&server)
            .await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(&server, None))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/hosts/billing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["serviceId"], "billing-8000");
        assert_eq!(items[0]["host"], "10.0.0.1");
        assert_eq!(items[0]["secure"], true);
        assert_eq!(items[1]["host"], "app-2");
        assert_eq!(items[1]["port"], 8001);
        assert_eq!(items[1]["tags"], json!([]));
    }

    #[actix_web::test]
    async fn test_hosts_agent_error_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/billing"))
            .respond_with(ResponseTemplate::new(500).set_body_string("no leader"))
            .mount(&server)
            .await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(&server, None))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/hosts/billing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);
    }
}
