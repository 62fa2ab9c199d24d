//! # Error Handling Module
//!
//! This module provides error handling for the gateway routing core using the `thiserror` crate.
//! It defines every error the registry, router and version negotiator can surface and maps
//! each one to the HTTP status code the request-handling layer should send to clients.
//!
//! ## Error Kinds
//!
//! - Routing failures (`UnknownService`, `UnknownEndpoint`) are client-addressable mistakes
//!   and map to 404.
//! - Transport failures while proxying (`UpstreamTransport`, `Timeout`) are gateway-level
//!   failures and map to 502/504. They are distinct from a successfully proxied 4xx/5xx
//!   upstream response, which is never an error.
//! - `UnsupportedVersion` is only raised when the caller asks for strict version enforcement.
//!
//! Health probe failures never show up here: the registry records them as a status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the gateway routing core
///
/// The `#[error("...")]` attribute from `thiserror` implements `Display`
/// with the specified message.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Routing to a service name absent from the registry
    #[error("Unknown service: {service}")]
    UnknownService { service: String },

    /// Routing to an endpoint absent from both the service's table and the static route table
    #[error("Unknown endpoint '{endpoint}' for service '{service}'")]
    UnknownEndpoint { service: String, endpoint: String },

    /// Connection refused, DNS failure or a broken connection while proxying
    #[error("Upstream transport error ({service}): {message}")]
    UpstreamTransport { service: String, message: String },

    /// Proxied call exceeded its timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Negotiated version is unknown, deprecated or past its sunset date
    #[error("Unsupported API version {version}: {reason}")]
    UnsupportedVersion { version: String, reason: String },

    /// Upstream service is known to be down, or the router has been shut down
    #[error("Service unavailable: {service} - {reason}")]
    ServiceUnavailable { service: String, reason: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Request validation errors (invalid registration, malformed body, etc.)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// Request body exceeds the proxy limit
    #[error("Request body exceeds {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    /// Version payload transformation errors
    #[error("Payload transformation failed: {reason}")]
    Transformation { reason: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unknown_service<S: Into<String>>(service: S) -> Self {
        Self::UnknownService {
            service: service.into(),
        }
    }

    pub fn unknown_endpoint<S: Into<String>, T: Into<String>>(service: S, endpoint: T) -> Self {
        Self::UnknownEndpoint {
            service: service.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Create an upstream transport error for a service
    pub fn upstream<S: Into<String>, T: Into<String>>(service: S, message: T) -> Self {
        Self::UpstreamTransport {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_version<S: Into<String>, T: Into<String>>(version: S, reason: T) -> Self {
        Self::UnsupportedVersion {
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Create a service unavailable error
    pub fn service_unavailable<S: Into<String>, T: Into<String>>(service: S, reason: T) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error for a named field
    pub fn validation<S: Into<String>, T: Into<String>>(field: S, reason: T) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transformation<S: Into<String>>(reason: S) -> Self {
        Self::Transformation { reason: reason.into() }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code clients should receive for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownService { .. } => StatusCode::NOT_FOUND,
            Self::UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UnsupportedVersion { .. } => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Transformation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is transient and the request may be retried by the client
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTransport { .. }
                | Self::Timeout { .. }
                | Self::ServiceUnavailable { .. }
                | Self::Io { .. }
        )
    }

    /// Whether this error came from the transport layer rather than from routing resolution
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::UpstreamTransport { .. } | Self::Timeout { .. })
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::UnknownService { .. } => "unknown_service",
            Self::UnknownEndpoint { .. } => "unknown_endpoint",
            Self::UpstreamTransport { .. } => "upstream_transport_error",
            Self::Timeout { .. } => "timeout",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Configuration { .. } => "configuration_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Transformation { .. } => "transformation_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Conversion used where no service context is available; the router
/// classifies reqwest errors itself so it can attach the service name.
impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamTransport {
            service: err
                .url()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
            message: err.to_string(),
        }
    }
}

/// Render errors as structured JSON responses with the mapped status code
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::unknown_service("billing").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::unknown_endpoint("billing", "refund").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::upstream("billing", "connection refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Timeout { timeout_ms: 5000 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::unsupported_version("1", "deprecated").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::PayloadTooLarge { limit_bytes: 1024 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::transformation("not an object").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::upstream("api", "connection refused").is_retryable());
        assert!(GatewayError::Timeout { timeout_ms: 5000 }.is_retryable());
        assert!(!GatewayError::unknown_service("api").is_retryable());
        assert!(!GatewayError::unsupported_version("0", "unknown").is_retryable());
    }

    #[test]
    fn test_transport_failures() {
        assert!(GatewayError::upstream("api", "dns").is_transport_failure());
        assert!(GatewayError::Timeout { timeout_ms: 10 }.is_transport_failure());
        assert!(!GatewayError::unknown_endpoint("api", "x").is_transport_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = GatewayError::unknown_endpoint("pipeline-generator", "explode");
        assert_eq!(
            err.to_string(),
            "Unknown endpoint 'explode' for service 'pipeline-generator'"
        );
        assert_eq!(err.error_type(), "unknown_endpoint");
    }
}
