//! # Configuration Module
//!
//! This module handles gateway configuration: the listener address, health monitor timing,
//! the static platform route table, the known API versions and logging/metrics settings.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Human-readable durations (`30s`, `5m`) through `humantime-serde`
//! - Environment variable override support
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::versioning::{ApiVersion, VersionNegotiationStrategy};

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration
    pub server: ServerConfig,

    /// Health monitor timing
    pub registry: RegistryConfig,

    /// Proxy defaults and the static route table
    pub routing: RoutingConfig,

    /// Known API versions and negotiation policy
    pub versioning: VersioningConfig,

    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_json::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a path, picking the parser from the file extension
    pub async fn load<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            Self::load_from_json(path).await
        } else {
            Self::load_from_file(path).await
        }
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: GATEWAY_<SECTION>_<FIELD>
    /// For example: GATEWAY_SERVER_HTTP_PORT=8080
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        use std::env;

        if let Ok(port) = env::var("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e)))?;
        }

        if let Ok(addr) = env::var("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Ok(interval) = env::var("GATEWAY_HEALTH_CHECK_INTERVAL") {
            self.registry.health_check_interval = humantime::parse_duration(&interval)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_HEALTH_CHECK_INTERVAL: {}", e)))?;
        }

        if let Ok(threshold) = env::var("GATEWAY_STALENESS_THRESHOLD") {
            self.registry.staleness_threshold = humantime::parse_duration(&threshold)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_STALENESS_THRESHOLD: {}", e)))?;
        }

        if let Ok(strategy) = env::var("GATEWAY_VERSION_STRATEGY") {
            self.versioning.strategy = strategy
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_VERSION_STRATEGY: {}", e)))?;
        }

        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Ok(format) = env::var("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid GATEWAY_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.registry.health_check_interval.is_zero() {
            errors.push("health_check_interval must be greater than 0".to_string());
        }

        if self.registry.probe_timeout.is_zero() {
            errors.push("probe_timeout must be greater than 0".to_string());
        }

        if self.registry.staleness_threshold.is_zero() {
            errors.push("staleness_threshold must be greater than 0".to_string());
        }

        if self.routing.default_timeout.is_zero() {
            errors.push("default_timeout must be greater than 0".to_string());
        }

        let mut seen_routes = HashSet::new();
        for route in &self.routing.routes {
            if route.service.is_empty() || route.endpoint.is_empty() {
                errors.push("route service and endpoint names cannot be empty".to_string());
            }
            if !seen_routes.insert((route.service.as_str(), route.endpoint.as_str())) {
                errors.push(format!(
                    "Duplicate route for {}/{}",
                    route.service, route.endpoint
                ));
            }
            if route.method.parse::<axum::http::Method>().is_err() {
                errors.push(format!(
                    "Invalid method '{}' for route {}/{}",
                    route.method, route.service, route.endpoint
                ));
            }
            if route.timeout.is_some_and(|timeout| timeout.is_zero()) {
                errors.push(format!(
                    "timeout for route {}/{} must be greater than 0",
                    route.service, route.endpoint
                ));
            }
        }

        if self.versioning.versions.is_empty() {
            errors.push("At least one API version must be configured".to_string());
        }

        let mut seen_versions = HashSet::new();
        for version in &self.versioning.versions {
            if version.version.is_empty() {
                errors.push("API version identifiers cannot be empty".to_string());
            }
            if !seen_versions.insert(version.version.as_str()) {
                errors.push(format!("Duplicate API version '{}'", version.version));
            }
            if let Some(url) = &version.documentation_url {
                if Url::parse(url).is_err() {
                    errors.push(format!(
                        "Invalid documentation_url for version {}: {}",
                        version.version, url
                    ));
                }
            }
        }

        if self.versioning.header_name.is_empty() {
            errors.push("versioning header_name cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

/// Health monitor timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interval between probe rounds
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// Timeout of a single health probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Age after which a recorded status is reported as degraded
    #[serde(with = "humantime_serde")]
    pub staleness_threshold: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            staleness_threshold: Duration::from_secs(5 * 60),
        }
    }
}

/// Proxy defaults and the static platform route table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Timeout used when neither the endpoint nor the route table sets one
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Reject calls to services whose last known status is down
    pub fail_fast_on_down: bool,

    /// Static (service, endpoint) routes
    pub routes: Vec<RouteDefinition>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            fail_fast_on_down: false,
            routes: Vec::new(),
        }
    }
}

/// One entry of the static route table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Registered service name
    pub service: String,

    /// Endpoint name within the service
    pub endpoint: String,

    /// HTTP method (GET, POST, etc.)
    pub method: String,

    /// Path template appended to the service base URL
    pub path: String,

    /// Route-specific timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// API version negotiation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Precedence among header, path and query signals
    pub strategy: VersionNegotiationStrategy,

    /// Reject requests targeting unsupported versions
    pub strict: bool,

    /// Request header carrying the requested version
    pub header_name: String,

    /// Known versions
    pub versions: Vec<ApiVersion>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            strategy: VersionNegotiationStrategy::HeaderFirst,
            strict: false,
            header_name: "accept-version".to_string(),
            versions: vec![ApiVersion::new("1")],
        }
    }
}

/// Observability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,

    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics_enabled: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.staleness_threshold, Duration::from_secs(300));
        assert_eq!(config.routing.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = GatewayConfig::default();
        config.server.bind_address.clear();
        config.versioning.versions.clear();
        config.routing.routes.push(RouteDefinition {
            service: "svc".to_string(),
            endpoint: "ep".to_string(),
            method: "NOT A METHOD".to_string(),
            path: "/x".to_string(),
            timeout: None,
        });

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bind_address"));
        assert!(err.contains("At least one API version"));
        assert!(err.contains("Invalid method"));
    }

    #[test]
    fn test_duplicate_routes_rejected() {
        let mut config = GatewayConfig::default();
        for _ in 0..2 {
            config.routing.routes.push(RouteDefinition {
                service: "pipeline-generator".to_string(),
                endpoint: "generate".to_string(),
                method: "POST".to_string(),
                path: "/generate".to_string(),
                timeout: None,
            });
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_route_timeout_rejected() {
        let mut config = GatewayConfig::default();
        config.routing.routes.push(RouteDefinition {
            service: "pipeline-optimizer".to_string(),
            endpoint: "optimize".to_string(),
            method: "POST".to_string(),
            path: "/optimize".to_string(),
            timeout: Some(Duration::ZERO),
        });

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout for route pipeline-optimizer/optimize"));

        config.routing.routes[0].timeout = Some(Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
server:
  http_port: 9090
registry:
  health_check_interval: 10s
  probe_timeout: 2s
  staleness_threshold: 1m
routing:
  fail_fast_on_down: true
  routes:
    - service: pipeline-generator
      endpoint: generate
      method: POST
      path: /generate
      timeout: 45s
versioning:
  strategy: path_first
  versions:
    - version: "1"
      deprecated: true
    - version: "2"
"#
        )
        .unwrap();

        let config = GatewayConfig::load(file.path()).await.unwrap();
        assert_eq!(config.server.http_port, 9090);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.registry.staleness_threshold, Duration::from_secs(60));
        assert!(config.routing.fail_fast_on_down);
        assert_eq!(config.routing.routes[0].timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.versioning.strategy, VersionNegotiationStrategy::PathFirst);
        assert!(config.versioning.versions[0].deprecated);
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let err = GatewayConfig::load_from_file("/definitely/not/here.yaml")
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "configuration_error");
    }
}
