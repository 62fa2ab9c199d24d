//! # Core Types Module
//!
//! This module defines the data structures shared by the registry, the health monitor,
//! the request router and the HTTP surface: service registrations and their endpoints,
//! health statuses, the tagged request/response payload and the proxy response envelope.
//!
//! ## Rust Ownership Concepts in This Module
//!
//! - Registrations are stored behind `Arc` by the registry and handed out as owned clones,
//!   so callers never hold a reference into the registry's internal map
//! - `Bytes` is reference counted, so cloning an opaque payload does not copy it
//! - `ServiceResponse` has no setters: it is built once per proxied call and owned by the caller

use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};

/// Health status of a registered backend service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Last probe answered with a 2xx status
    Healthy,
    /// Service is reachable but not trusted, e.g. its last probe is too old
    Degraded,
    /// Last probe failed or the service is not registered
    Down,
    /// Not probed yet
    Unknown,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        ServiceStatus::Unknown
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Healthy => write!(f, "healthy"),
            ServiceStatus::Degraded => write!(f, "degraded"),
            ServiceStatus::Down => write!(f, "down"),
            ServiceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Advisory rate limit attached to an endpoint
///
/// The router carries this with the endpoint policy; enforcement belongs to a
/// downstream traffic layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub limit: u32,

    /// Time window for rate limiting
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

/// One named endpoint of a backend service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// HTTP method used when proxying to this endpoint
    #[serde(with = "method_serde")]
    pub method: Method,

    /// Path template appended to the service base URL
    pub path: String,

    /// Advisory rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Whether responses from this endpoint may be cached
    #[serde(default)]
    pub cache_enabled: bool,

    /// Per-call timeout; the router default applies when unset
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ServiceEndpoint {
    /// Create an endpoint with no rate limit, caching off and the default timeout
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            rate_limit: None,
            cache_enabled: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.rate_limit = Some(RateLimitConfig { limit, window });
        self
    }

    pub fn with_cache(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self
    }
}

/// Custom serialization for HTTP methods (stored as their upper-case names)
mod method_serde {
    use axum::http::Method;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(method: &Method, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Method, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Method::from_str(&raw.to_uppercase()).map_err(serde::de::Error::custom)
    }
}

/// Registration record for one backend service
///
/// The registry is the sole owner of stored records. `status` and
/// `last_health_check` only change through the registry's health updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Opaque identifier; generated at registration time when empty
    #[serde(default)]
    pub service_id: String,

    /// Logical service name, unique among active registrations
    pub name: String,

    /// Backend version string, informational only
    #[serde(default)]
    pub version: String,

    /// Base URL used to build proxied request targets
    pub url: String,

    /// URL polled by the health monitor
    pub health_check_url: String,

    /// Endpoint table keyed by endpoint name
    #[serde(default)]
    pub endpoints: HashMap<String, ServiceEndpoint>,

    #[serde(default)]
    pub status: ServiceStatus,

    /// Time of the most recent probe attempt, successful or not
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ServiceRegistration {
    /// Create a registration with no endpoints and an unassigned id
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
        health_check_url: impl Into<String>,
    ) -> Self {
        Self {
            service_id: String::new(),
            name: name.into(),
            version: version.into(),
            url: url.into(),
            health_check_url: health_check_url.into(),
            endpoints: HashMap::new(),
            status: ServiceStatus::Unknown,
            last_health_check: None,
        }
    }

    /// Add a named endpoint
    pub fn with_endpoint(mut self, name: impl Into<String>, endpoint: ServiceEndpoint) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }

    /// Look up an endpoint in this service's own table
    pub fn endpoint(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.get(name)
    }
}

/// Request or response body as seen by the proxy
///
/// The variant is chosen from the content type, never from the bytes themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured JSON document
    Json(serde_json::Value),
    /// Opaque bytes of any other content type
    Bytes(Bytes),
}

impl Payload {
    /// Decode a body according to its content type
    ///
    /// JSON content types are parsed; a body that claims to be JSON but does not
    /// parse is kept as bytes.
    pub fn from_body(content_type: Option<&str>, body: Bytes) -> Self {
        if content_type.map(is_json_content_type).unwrap_or(false) && !body.is_empty() {
            if let Ok(value) = serde_json::from_slice(&body) {
                return Payload::Json(value);
            }
        }
        Payload::Bytes(body)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Bytes(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Json(_) => false,
            Payload::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> GatewayResult<Bytes> {
        match self {
            Payload::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| GatewayError::transformation(format!("failed to encode JSON payload: {}", e))),
            Payload::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Check whether a content type denotes JSON (`application/json` or any `+json` suffix)
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Normalized result of one proxied call
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    /// Upstream HTTP status code, 4xx and 5xx included
    pub status_code: u16,

    /// Upstream response headers, hop-by-hop headers removed
    pub headers: HeaderMap,

    pub body: Payload,

    /// Body exactly as the upstream sent it
    pub raw_body: Bytes,

    /// Wall-clock time measured around the upstream call
    pub duration_ms: u64,
}

impl ServiceResponse {
    /// Build a response from the upstream's raw body, decoding it by content type
    pub fn new(status_code: u16, headers: HeaderMap, raw_body: Bytes, duration_ms: u64) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let body = Payload::from_body(content_type, raw_body.clone());

        Self {
            status_code,
            headers,
            body,
            raw_body,
            duration_ms,
        }
    }

    /// Upstream status as a typed status code
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_GATEWAY)
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Content type reported by the upstream, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/octet-stream"));
    }

    #[test]
    fn test_payload_from_body() {
        let json_body = Payload::from_body(
            Some("application/json"),
            Bytes::from_static(br#"{"result":"success"}"#),
        );
        assert_eq!(json_body, Payload::Json(json!({"result": "success"})));

        let text_body = Payload::from_body(Some("text/plain"), Bytes::from_static(b"{}"));
        assert_eq!(text_body, Payload::Bytes(Bytes::from_static(b"{}")));

        // Claims JSON but is not
        let broken = Payload::from_body(Some("application/json"), Bytes::from_static(b"not json"));
        assert!(matches!(broken, Payload::Bytes(_)));
    }

    #[test]
    fn test_registration_deserialization() {
        let registration: ServiceRegistration = serde_json::from_value(json!({
            "name": "pipeline-generator",
            "version": "1.4.0",
            "url": "http://generator:8000",
            "health_check_url": "http://generator:8000/health",
            "endpoints": {
                "generate": {
                    "method": "post",
                    "path": "/generate",
                    "timeout": "30s",
                    "rate_limit": { "limit": 10, "window": "1m" }
                }
            }
        }))
        .unwrap();

        assert!(registration.service_id.is_empty());
        assert_eq!(registration.status, ServiceStatus::Unknown);
        let endpoint = registration.endpoint("generate").unwrap();
        assert_eq!(endpoint.method, Method::POST);
        assert_eq!(endpoint.timeout, Some(Duration::from_secs(30)));
        assert_eq!(endpoint.rate_limit.as_ref().unwrap().window, Duration::from_secs(60));
        assert!(!endpoint.cache_enabled);
    }

    #[test]
    fn test_endpoint_builder_serializes_like_config() {
        let endpoint = ServiceEndpoint::new(Method::POST, "/analyze")
            .with_timeout(Duration::from_secs(60))
            .with_rate_limit(20, Duration::from_secs(60))
            .with_cache(true);

        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["timeout"], "1m");
        assert_eq!(value["rate_limit"]["limit"], 20);
        assert_eq!(value["cache_enabled"], true);

        let parsed: ServiceEndpoint = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, endpoint);
    }

    #[test]
    fn test_service_response_keeps_raw_body() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let raw = Bytes::from_static(br#"{"zeta": 1, "alpha": 12345678901234567890123}"#);

        let response = ServiceResponse::new(200, headers, raw.clone(), 3);
        assert_eq!(response.raw_body, raw);
        assert_eq!(response.body.as_json().unwrap()["zeta"], 1);
    }

    #[test]
    fn test_service_status_display() {
        assert_eq!(ServiceStatus::Healthy.to_string(), "healthy");
        assert_eq!(ServiceStatus::Down.to_string(), "down");
        assert_eq!(ServiceStatus::default(), ServiceStatus::Unknown);
    }
}
