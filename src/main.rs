//! # Pipeline Gateway - Main Entry Point
//!
//! Startup sequence:
//! 1. Load configuration (`GATEWAY_CONFIG_PATH`, default `config/gateway.yaml`)
//! 2. Initialise logging and, when enabled, the Prometheus recorder
//! 3. Build the registry, router and version negotiator
//! 4. Start the health monitor and serve until SIGTERM or Ctrl+C
//! 5. Drain connections, then stop the monitor through `RequestRouter::cleanup`

use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use pipeline_gateway::observability::{init_logging, metrics::install_prometheus_recorder};
use pipeline_gateway::routing::build_http_client;
use pipeline_gateway::{
    AppState, GatewayConfig, GatewayResult, GatewayServer, RequestRouter, RouteTable, ServiceRegistry,
    VersionNegotiator,
};

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path).await?;

    init_logging(&config.observability.logging)?;

    info!("Starting Pipeline Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let http_client = build_http_client()?;
    let registry = Arc::new(ServiceRegistry::with_http_client(
        config.registry.clone(),
        http_client.clone(),
    ));
    let route_table = RouteTable::from_definitions(&config.routing.routes)?;
    let router = Arc::new(RequestRouter::with_client(
        registry.clone(),
        http_client,
        route_table,
        &config.routing,
    ));
    let negotiator = Arc::new(VersionNegotiator::from_config(&config.versioning)?);

    info!(
        routes = router.route_table().len(),
        versions = negotiator.versions().len(),
        latest = %negotiator.latest_version(),
        strategy = %config.versioning.strategy,
        "Routing core initialised"
    );

    let mut state = AppState::new(router.clone(), negotiator, config.versioning.clone());
    if config.observability.metrics_enabled {
        state = state.with_metrics(install_prometheus_recorder()?);
        info!("Prometheus metrics enabled at /metrics");
    }

    let server = GatewayServer::new(state, &config.server)?;
    let monitor = registry.start_health_monitor();

    let result = server.start(shutdown_signal()).await;
    if let Err(e) = &result {
        error!("Gateway server failed: {}", e);
    }

    router.cleanup();
    if let Err(e) = monitor.await {
        warn!("Health monitor task ended abnormally: {}", e);
    }

    info!("Pipeline Gateway shutdown complete");
    result
}

/// Load configuration, falling back to defaults when the file does not exist
async fn load_config(path: &str) -> GatewayResult<GatewayConfig> {
    if Path::new(path).exists() {
        return GatewayConfig::load(path).await;
    }

    // Logging is not initialised yet
    eprintln!("Configuration file {} not found, using defaults", path);
    let mut config = GatewayConfig::default();
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Resolve on SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
