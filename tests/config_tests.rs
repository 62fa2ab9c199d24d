//! # Configuration Tests
//!
//! The shipped sample configuration must load, validate and build a router.

use pipeline_gateway::core::config::LogFormat;
use pipeline_gateway::{GatewayConfig, RouteTable, VersionNegotiationStrategy, VersionNegotiator};
use std::path::PathBuf;
use std::time::Duration;

fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/gateway.yaml")
}

#[tokio::test]
async fn test_sample_config_loads() {
    let config = GatewayConfig::load(sample_config_path()).await.unwrap();

    assert_eq!(config.registry.health_check_interval, Duration::from_secs(30));
    assert_eq!(config.registry.staleness_threshold, Duration::from_secs(300));
    assert_eq!(config.routing.default_timeout, Duration::from_secs(30));
    assert_eq!(config.versioning.strategy, VersionNegotiationStrategy::HeaderFirst);
    assert_eq!(config.observability.logging.format, LogFormat::Json);
}

#[tokio::test]
async fn test_sample_routes_build_table() {
    let config = GatewayConfig::load(sample_config_path()).await.unwrap();
    let table = RouteTable::from_definitions(&config.routing.routes).unwrap();

    let generate = table.get("pipeline-generator", "generate").unwrap();
    assert_eq!(generate.method, axum::http::Method::POST);
    assert_eq!(generate.timeout, Some(Duration::from_secs(60)));
    assert!(table.get("pipeline-optimizer", "optimize").is_some());

    let negotiator = VersionNegotiator::from_config(&config.versioning).unwrap();
    assert_eq!(negotiator.latest_version(), "2");
}
