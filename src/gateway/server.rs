//! # HTTP Server Module
//!
//! This module implements the gateway's HTTP surface using the Axum framework. Each
//! proxied request goes through version negotiation, then the request router,
//! then back through the negotiator so the response carries version metadata.
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing the router and negotiator across handler tasks
//! - `tracing::Instrument` attaches a per-request span carrying the correlation id
//! - `axum::serve(..).with_graceful_shutdown(..)` drains connections on shutdown

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router as AxumRouter,
};
use metrics_exporter_prometheus::PrometheusHandle;
use regex::Regex;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, Instrument};

use crate::admin::{
    ServiceManagementRouter, ServiceManagementState, VersionManagementRouter, VersionManagementState,
};
use crate::core::config::{ServerConfig, VersioningConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::Payload;
use crate::observability::logging::{CorrelationId, REQUEST_ID_HEADER};
use crate::routing::router::RequestRouter;
use crate::versioning::negotiator::VersionNegotiator;

/// Largest request body accepted for proxying
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state for gateway handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub negotiator: Arc<VersionNegotiator>,
    pub versioning: VersioningConfig,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(router: Arc<RequestRouter>, negotiator: Arc<VersionNegotiator>, versioning: VersioningConfig) -> Self {
        Self {
            router,
            negotiator,
            versioning,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Build the complete gateway application
///
/// Versioned proxy paths (`/v1/route/..`, `/api/v1/route/..`) are resolved by the
/// fallback handler so they never conflict with the admin routes.
pub fn build_app(state: AppState) -> AxumRouter {
    let services = ServiceManagementRouter::create_router(ServiceManagementState {
        service_registry: state.router.registry().clone(),
    });
    let versions = VersionManagementRouter::create_router(VersionManagementState {
        negotiator: state.negotiator.clone(),
        strategy: state.versioning.strategy,
    });

    let gateway = AxumRouter::new()
        .route("/route/:service/:endpoint", any(proxy_handler))
        .route("/health", get(gateway_health_check))
        .route("/metrics", get(metrics_handler))
        .fallback(fallback_handler)
        .with_state(state);

    gateway
        .merge(services)
        .merge(versions)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the gateway application
pub struct GatewayServer {
    app: AxumRouter,
    bind_addr: SocketAddr,
}

impl GatewayServer {
    pub fn new(state: AppState, config: &ServerConfig) -> GatewayResult<Self> {
        let bind_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
            .parse()
            .map_err(|e| {
                GatewayError::config(format!(
                    "Invalid bind address {}:{}: {}",
                    config.bind_address, config.http_port, e
                ))
            })?;

        Ok(Self {
            app: build_app(state),
            bind_addr,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Serve until `shutdown` resolves, then drain open connections
    pub async fn start<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind gateway server to {}: {}", self.bind_addr, e))
        })?;

        info!("Gateway HTTP server listening on {}", self.bind_addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))?;

        info!("Gateway HTTP server stopped");
        Ok(())
    }
}

fn route_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:/api)?(?:/v\d+)?/route/([^/]+)/([^/]+)/?$").expect("route path pattern is valid")
    })
}

/// Extract (service, endpoint) from a possibly version-prefixed proxy path
pub fn parse_route_path(path: &str) -> Option<(String, String)> {
    route_path_pattern()
        .captures(path)
        .map(|captures| (captures[1].to_string(), captures[2].to_string()))
}

async fn proxy_handler(
    State(state): State<AppState>,
    Path((service, endpoint)): Path<(String, String)>,
    request: Request,
) -> Response {
    proxy(state, service, endpoint, request).await
}

async fn fallback_handler(State(state): State<AppState>, request: Request) -> Response {
    match parse_route_path(request.uri().path()) {
        Some((service, endpoint)) => proxy(state, service, endpoint, request).await,
        None => {
            let body = json!({
                "error": {
                    "code": 404,
                    "message": format!("No route for {}", request.uri().path()),
                    "type": "not_found",
                    "retryable": false,
                }
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

async fn proxy(state: AppState, service: String, endpoint: String, request: Request) -> Response {
    let correlation_id = CorrelationId::from_headers(request.headers());
    let span = info_span!(
        "proxy",
        request_id = %correlation_id,
        service = %service,
        endpoint = %endpoint
    );

    async move {
        let mut response = match proxy_inner(&state, &service, &endpoint, request, &correlation_id).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Proxy request failed: {}", e);
                e.into_response()
            }
        };

        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

async fn proxy_inner(
    state: &AppState,
    service: &str,
    endpoint: &str,
    request: Request,
    correlation_id: &CorrelationId,
) -> GatewayResult<Response> {
    let (parts, body) = request.into_parts();
    let negotiator = &state.negotiator;
    let strategy = state.versioning.strategy;

    let version_header = parts
        .headers
        .get(state.versioning.header_name.as_str())
        .and_then(|value| value.to_str().ok());

    let (version, explicit) = if state.versioning.strict {
        negotiator.negotiate_strict(&parts.uri, version_header, strategy)?
    } else {
        negotiator.negotiate_version(&parts.uri, version_header, strategy)
    };
    let latest = negotiator.latest_version();
    debug!(version = %version, explicit, "Resolved API version");

    // Bodies are forwarded byte-for-byte unless an adapter rewrites them
    let adapted = negotiator.has_transformer(&version, &latest);

    let declared_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_length.is_some_and(|length| length > MAX_BODY_BYTES) {
        return Err(GatewayError::PayloadTooLarge {
            limit_bytes: MAX_BODY_BYTES,
        });
    }

    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        let reason = e.into_inner().to_string();
        if reason.contains("length limit") {
            GatewayError::PayloadTooLarge {
                limit_bytes: MAX_BODY_BYTES,
            }
        } else {
            GatewayError::validation("body", reason)
        }
    })?;
    let payload = if body.is_empty() {
        None
    } else if adapted {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let payload = Payload::from_body(content_type, body);
        Some(negotiator.transform_request_for_version(payload, &version, &latest)?)
    } else {
        Some(Payload::Bytes(body))
    };

    let mut forwarded: HeaderMap = parts.headers.clone();
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        forwarded.insert(REQUEST_ID_HEADER, value);
    }

    let upstream = state
        .router
        .route_request(service, endpoint, &parts.method, &forwarded, payload)
        .await?;

    let status = upstream.status();
    let mut headers = upstream.headers;
    let body = if adapted {
        negotiator
            .transform_response_for_version(upstream.body, &latest, &version)?
            .encode()?
    } else {
        upstream.raw_body
    };
    negotiator.add_version_headers(&mut headers, &version);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Gateway health check handler
pub async fn gateway_health_check(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.router.registry();
    let status = if state.router.is_closed() { "shutting_down" } else { "healthy" };

    let health_info = json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "gateway",
        "services": registry.stats(),
    });

    (StatusCode::OK, Json(health_info))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{RegistryConfig, RoutingConfig};
    use crate::discovery::registry::ServiceRegistry;
    use tower::ServiceExt;

    fn test_app() -> AxumRouter {
        let registry = Arc::new(ServiceRegistry::with_http_probe(RegistryConfig::default()));
        let router = Arc::new(RequestRouter::new(registry, &RoutingConfig::default()).unwrap());
        let versioning = VersioningConfig::default();
        let negotiator = Arc::new(VersionNegotiator::from_config(&versioning).unwrap());
        build_app(AppState::new(router, negotiator, versioning))
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = test_app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_versioned_proxy_path_reaches_router() {
        let response = test_app()
            .oneshot(get("/api/v1/route/unregistered/generate"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[test]
    fn test_parse_route_path() {
        assert_eq!(
            parse_route_path("/route/pipeline-generator/generate"),
            Some(("pipeline-generator".to_string(), "generate".to_string()))
        );
        assert_eq!(
            parse_route_path("/v2/route/svc/ep/"),
            Some(("svc".to_string(), "ep".to_string()))
        );
        assert_eq!(
            parse_route_path("/api/v1/route/svc/ep"),
            Some(("svc".to_string(), "ep".to_string()))
        );
        assert_eq!(parse_route_path("/route/svc"), None);
        assert_eq!(parse_route_path("/api/v1/other/svc/ep"), None);
    }
}
