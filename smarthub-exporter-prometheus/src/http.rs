//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::SharedCollector;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: SharedCollector,
}

/// Create the HTTP router.
fn create_router(collector: SharedCollector, metrics_path: &str) -> Router {
    let state = AppState { collector };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Every request runs one scrape.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.collector.collect().await;

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.collector.is_ready() {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no successful WAN scrape yet\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    collector: SharedCollector,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(collector: SharedCollector, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            collector,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.collector, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LAN_PATH, RouterClient, WAN_PATH};
    use crate::collector::MetricCollector;
    use crate::config::{FilterConfig, PrometheusConfig};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_collector(base_url: &str) -> SharedCollector {
        let client = RouterClient::from_reqwest(base_url, reqwest::Client::new());
        Arc::new(MetricCollector::new(
            client,
            PrometheusConfig::default(),
            &FilterConfig::default(),
            true,
        ))
    }

    /// A collector whose router refuses connections.
    fn unreachable_collector() -> SharedCollector {
        make_collector("http://127.0.0.1:1")
    }

    async fn get(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint_scrapes() {
        let collector = unreachable_collector();
        let response = get(create_router(collector.clone(), "/metrics"), "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let stats = collector.stats();
        assert_eq!(stats.scrapes, 1);
        assert_eq!(stats.wan_failures, 1);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = get(create_router(unreachable_collector(), "/metrics"), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_ready_while_router_unreachable() {
        let collector = unreachable_collector();
        let router = create_router(collector, "/metrics");

        assert_eq!(
            get(router.clone(), "/ready").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        get(router.clone(), "/metrics").await;
        assert_eq!(
            get(router, "/ready").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_ready_after_successful_scrape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WAN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(include_str!(
                "../../smarthub-common/tests/fixtures/wan_conn.xml"
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LAN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(include_str!(
                "../../smarthub-common/tests/fixtures/lan.js"
            )))
            .mount(&server)
            .await;

        let router = create_router(make_collector(&server.uri()), "/metrics");
        assert_eq!(
            get(router.clone(), "/ready").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        assert_eq!(get(router.clone(), "/metrics").await.status(), StatusCode::OK);
        assert_eq!(get(router, "/ready").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = create_router(unreachable_collector(), "/prometheus/metrics");

        assert_eq!(
            get(router.clone(), "/prometheus/metrics").await.status(),
            StatusCode::OK
        );
        assert_eq!(get(router, "/metrics").await.status(), StatusCode::NOT_FOUND);
    }
}
