//! # Health Probing
//!
//! This module provides the probe used by the service registry's health monitor.
//! A probe issues one request against a service's health-check URL and turns the
//! outcome into a [`ServiceStatus`]: a 2xx answer is healthy, anything else (another
//! status, a timeout, a refused connection, a DNS failure) is down.
//!
//! Probes never return errors. Failures are data, recorded by the registry as the
//! service's status.
//!
//! ## Rust Concepts Used
//! - `async_trait` for async methods in the `HealthProbe` trait, so tests can swap in
//!   a scripted probe
//! - `tokio::time::timeout` bounds every probe independently of the client settings

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

use crate::core::types::ServiceStatus;

/// Outcome of a single health probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    /// Resulting status: `Healthy` or `Down`
    pub status: ServiceStatus,
    /// Failure details
    pub message: Option<String>,
    /// Duration of the probe
    pub duration: Duration,
    /// When the probe was attempted
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn new(status: ServiceStatus, message: Option<String>, duration: Duration) -> Self {
        Self {
            status,
            message,
            duration,
            checked_at: Utc::now(),
        }
    }

    /// Create a successful probe result
    pub fn success(duration: Duration) -> Self {
        Self::new(ServiceStatus::Healthy, None, duration)
    }

    /// Create a failed probe result
    pub fn failure(error: String, duration: Duration) -> Self {
        Self::new(ServiceStatus::Down, Some(error), duration)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Health probe trait for different probe implementations
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `url`, giving up after `timeout`
    async fn check(&self, url: &str, timeout: Duration) -> ProbeResult;

    /// Get the probe type name
    fn probe_type(&self) -> &'static str;
}

/// HTTP GET health probe
pub struct HttpHealthProbe {
    client: HttpClient,
}

impl HttpHealthProbe {
    /// Create a new HTTP health probe with its own client
    pub fn new() -> Self {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self { client }
    }

    /// Create a probe sharing an existing client (and its connection pool)
    pub fn with_client(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, url: &str, probe_timeout: Duration) -> ProbeResult {
        let start_time = Instant::now();

        let result = timeout(probe_timeout, self.client.get(url).send()).await;
        let duration = start_time.elapsed();

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    debug!("Health probe {} succeeded in {:?}", url, duration);
                    ProbeResult::success(duration)
                } else {
                    ProbeResult::failure(format!("Unexpected status code: {}", status.as_u16()), duration)
                }
            }
            Ok(Err(e)) => ProbeResult::failure(format!("HTTP request failed: {}", e), duration),
            Err(_) => ProbeResult::failure(
                format!("Health check timed out after {:?}", probe_timeout),
                duration,
            ),
        }
    }

    fn probe_type(&self) -> &'static str {
        "http"
    }
}
