//! # Request Router Module
//!
//! This module proxies a call addressed as (service name, endpoint name) to the
//! registered backend. The endpoint is looked up in the service's own endpoint table
//! first and in the static route table second; its configured method, path and
//! timeout decide how the upstream call is made.
//!
//! Any HTTP status returned by the upstream is a successful proxy. Only transport
//! failures (refused connections, DNS errors, broken streams) and timeouts are errors.
//! There are no retries.
//!
//! ## Rust Concepts Used
//!
//! - `Arc<ServiceRegistry>` shares the registry with the health monitor and admin API
//! - `AtomicBool` marks the router closed without taking a lock on the hot path
//! - `reqwest::Client` is cloned cheaply and pools connections internally

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use reqwest::Client as HttpClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::config::RoutingConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{Payload, ServiceEndpoint, ServiceResponse, ServiceStatus};
use crate::discovery::registry::ServiceRegistry;
use crate::observability::metrics;
use crate::routing::route_table::RouteTable;

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Build the HTTP client shared by routed calls and health probes
///
/// No client-wide timeout is set: every proxied call and probe carries its own.
pub fn build_http_client() -> GatewayResult<HttpClient> {
    HttpClient::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))
}

/// A (service, endpoint) pair resolved to a concrete upstream call
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub service_id: String,
    pub url: String,
    pub method: Method,
    pub timeout: Duration,
    pub endpoint: ServiceEndpoint,
}

/// Proxies calls to registered backend services
pub struct RequestRouter {
    registry: Arc<ServiceRegistry>,
    client: HttpClient,
    route_table: RouteTable,
    default_timeout: Duration,
    fail_fast_on_down: bool,
    closed: AtomicBool,
}

impl RequestRouter {
    /// Create a router with its own client from routing configuration
    pub fn new(registry: Arc<ServiceRegistry>, config: &RoutingConfig) -> GatewayResult<Self> {
        let client = build_http_client()?;
        let route_table = RouteTable::from_definitions(&config.routes)?;
        Ok(Self::with_client(registry, client, route_table, config))
    }

    /// Create a router with an explicit client and route table
    pub fn with_client(
        registry: Arc<ServiceRegistry>,
        client: HttpClient,
        route_table: RouteTable,
        config: &RoutingConfig,
    ) -> Self {
        Self {
            registry,
            client,
            route_table,
            default_timeout: config.default_timeout,
            fail_fast_on_down: config.fail_fast_on_down,
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve a (service, endpoint) pair without calling the upstream
    pub fn resolve(&self, service: &str, endpoint: &str) -> GatewayResult<ResolvedRoute> {
        let registration = self
            .registry
            .get_service(service)
            .ok_or_else(|| GatewayError::unknown_service(service))?;

        let table_entry = self.route_table.get(service, endpoint);
        let definition = registration
            .endpoint(endpoint)
            .or(table_entry)
            .cloned()
            .ok_or_else(|| GatewayError::unknown_endpoint(service, endpoint))?;

        let timeout = definition
            .timeout
            .or_else(|| table_entry.and_then(|entry| entry.timeout))
            .unwrap_or(self.default_timeout);

        Ok(ResolvedRoute {
            service_id: registration.service_id,
            url: join_url(&registration.url, &definition.path),
            method: definition.method.clone(),
            timeout,
            endpoint: definition,
        })
    }

    /// Proxy one call to `service`'s `endpoint`
    ///
    /// `method` is the inbound method; the endpoint's configured method is the one
    /// sent upstream.
    pub async fn route_request(
        &self,
        service: &str,
        endpoint: &str,
        method: &Method,
        headers: &HeaderMap,
        body: Option<Payload>,
    ) -> GatewayResult<ServiceResponse> {
        let result = self.route_inner(service, endpoint, method, headers, body).await;

        if let Err(e) = &result {
            metrics::record_route_failure(service, e.error_type());
        }

        result
    }

    async fn route_inner(
        &self,
        service: &str,
        endpoint: &str,
        method: &Method,
        headers: &HeaderMap,
        body: Option<Payload>,
    ) -> GatewayResult<ServiceResponse> {
        if self.is_closed() {
            return Err(GatewayError::service_unavailable(service, "router is shut down"));
        }

        let route = self.resolve(service, endpoint)?;

        if self.fail_fast_on_down {
            let (status, _) = self.registry.get_service_status(&route.service_id);
            if status == ServiceStatus::Down {
                return Err(GatewayError::service_unavailable(
                    service,
                    "last health check reported the service down",
                ));
            }
        }

        if *method != route.method {
            debug!(
                service = %service,
                endpoint = %endpoint,
                inbound = %method,
                configured = %route.method,
                "Using configured endpoint method"
            );
        }

        debug!(
            service = %service,
            endpoint = %endpoint,
            method = %route.method,
            target = %route.url,
            timeout_ms = route.timeout.as_millis() as u64,
            cache_enabled = route.endpoint.cache_enabled,
            "Routing request"
        );

        let request = self.build_request(service, &route, headers, body)?;

        let start_time = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(service, route.timeout, e))?;

        let status_code = response.status().as_u16();
        let response_headers = convert_response_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(service, route.timeout, e))?;
        let duration = start_time.elapsed();

        metrics::record_route(service, endpoint, status_code, duration);
        debug!(
            service = %service,
            endpoint = %endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "Upstream responded"
        );

        Ok(ServiceResponse::new(
            status_code,
            response_headers,
            body,
            duration.as_millis() as u64,
        ))
    }

    fn build_request(
        &self,
        service: &str,
        route: &ResolvedRoute,
        headers: &HeaderMap,
        body: Option<Payload>,
    ) -> GatewayResult<reqwest::RequestBuilder> {
        let method = reqwest::Method::from_bytes(route.method.as_str().as_bytes())
            .map_err(|e| GatewayError::upstream(service, format!("invalid method: {}", e)))?;

        let mut forwarded = convert_request_headers(headers);
        if matches!(body, Some(Payload::Json(_))) && !forwarded.contains_key(reqwest::header::CONTENT_TYPE) {
            forwarded.insert(
                reqwest::header::CONTENT_TYPE,
                reqwest::header::HeaderValue::from_static("application/json"),
            );
        }
        let body = body.as_ref().map(Payload::encode).transpose()?;

        let mut request = self
            .client
            .request(method, route.url.as_str())
            .headers(forwarded)
            .timeout(route.timeout);

        if let Some(body) = body {
            request = request.body(body);
        }

        Ok(request)
    }

    /// Stop the health monitor and reject further calls
    ///
    /// Calls already in flight complete or time out on their own. Safe to call
    /// more than once.
    pub fn cleanup(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.stop_health_monitor();
        info!("Request router shut down");
    }
}

/// Join a base URL and an endpoint path with exactly one `/` between them
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

fn convert_request_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut converted = reqwest::header::HeaderMap::new();

    for (name, value) in headers {
        let name = name.as_str();
        // Host and length are derived from the target URL and the re-encoded body
        if is_hop_by_hop(name) || name == "host" || name == "content-length" {
            continue;
        }

        match (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                converted.append(name, value);
            }
            _ => warn!(header = %name, "Dropping header that cannot be forwarded"),
        }
    }

    converted
}

fn convert_response_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut converted = HeaderMap::new();

    for (name, value) in headers {
        let name = name.as_str();
        if is_hop_by_hop(name) || name == "content-length" {
            continue;
        }

        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            converted.append(name, value);
        }
    }

    converted
}

fn map_transport_error(service: &str, timeout: Duration, error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        warn!(service = %service, timeout_ms = timeout.as_millis() as u64, "Upstream call timed out");
        GatewayError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        warn!(service = %service, error = %error, "Upstream call failed");
        GatewayError::upstream(service, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RegistryConfig;
    use crate::core::types::ServiceRegistration;
    use crate::observability::health::{HealthProbe, ProbeResult};
    use async_trait::async_trait;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthProbe for AlwaysHealthy {
        async fn check(&self, _url: &str, _timeout: Duration) -> ProbeResult {
            ProbeResult::success(Duration::from_millis(1))
        }

        fn probe_type(&self) -> &'static str {
            "always-healthy"
        }
    }

    fn router_with(routes: RouteTable) -> RequestRouter {
        let registry = Arc::new(ServiceRegistry::new(RegistryConfig::default(), Arc::new(AlwaysHealthy)));
        RequestRouter::with_client(registry, HttpClient::new(), routes, &RoutingConfig::default())
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://svc:8000/", "/api/generate"), "http://svc:8000/api/generate");
        assert_eq!(join_url("http://svc:8000", "api/generate"), "http://svc:8000/api/generate");
        assert_eq!(join_url("http://svc:8000/", ""), "http://svc:8000");
    }

    #[test]
    fn test_hop_by_hop() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("authorization"));
    }

    #[test]
    fn test_request_headers_filtered() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("host", HeaderValue::from_static("gateway"));
        headers.insert("authorization", HeaderValue::from_static("Bearer token"));

        let converted = convert_request_headers(&headers);
        assert_eq!(converted.len(), 1);
        assert!(converted.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_resolve_prefers_service_endpoint() {
        let mut routes = RouteTable::new();
        routes.insert(
            "svc",
            "generate",
            ServiceEndpoint::new(Method::PUT, "/table/generate").with_timeout(Duration::from_secs(9)),
        );
        let router = router_with(routes);

        let registration = ServiceRegistration::new("svc", "1", "http://svc:8000", "http://svc:8000/health")
            .with_endpoint("generate", ServiceEndpoint::new(Method::POST, "/own/generate"));
        router.registry().register_service(registration).await.unwrap();

        let route = router.resolve("svc", "generate").unwrap();
        assert_eq!(route.url, "http://svc:8000/own/generate");
        assert_eq!(route.method, Method::POST);
        // Endpoint has no timeout of its own, so the table's applies
        assert_eq!(route.timeout, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_table_and_default_timeout() {
        let mut routes = RouteTable::new();
        routes.insert("svc", "status", ServiceEndpoint::new(Method::GET, "/status"));
        let router = router_with(routes);

        router
            .registry()
            .register_service(ServiceRegistration::new("svc", "1", "http://svc:8000/", "http://svc:8000/health"))
            .await
            .unwrap();

        let route = router.resolve("svc", "status").unwrap();
        assert_eq!(route.url, "http://svc:8000/status");
        assert_eq!(route.timeout, Duration::from_secs(30));

        assert!(matches!(
            router.resolve("svc", "missing"),
            Err(GatewayError::UnknownEndpoint { .. })
        ));
        assert!(matches!(
            router.resolve("other", "status"),
            Err(GatewayError::UnknownService { .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let router = router_with(RouteTable::new());
        router.cleanup();
        router.cleanup();

        assert!(router.is_closed());
        assert!(router.registry().is_monitor_stopped());

        let err = router
            .route_request("svc", "generate", &Method::POST, &HeaderMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ServiceUnavailable { .. }));
    }
}
