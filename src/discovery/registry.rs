//! # Service Registry Module
//!
//! In-memory registry of backend services and the health monitor that keeps their
//! status current. The router reads from it on every proxied call and the admin API
//! mutates it.
//!
//! ## How it works
//!
//! Records live in a map keyed by `service_id`, with a second map from service name
//! to id. Both maps sit behind one `RwLock`, so a name never points at a missing id.
//! Each record is an `Arc<ServiceRegistration>` that is replaced wholesale on update:
//! a reader holding a snapshot never observes a status without its matching
//! `last_health_check`.
//!
//! The health monitor is a background task started with
//! [`ServiceRegistry::start_health_monitor`]. Every interval it probes all registered
//! services concurrently, each probe bounded by its own timeout. Probe failures are
//! recorded as `Down`, logged, and never raised.
//!
//! ## Rust Concepts Used
//!
//! - `parking_lot::RwLock` guards are never held across an `.await`
//! - `tokio::sync::broadcast` publishes registry changes to any number of subscribers
//! - `CancellationToken` stops the monitor between rounds without aborting probes in flight

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::core::config::RegistryConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{ServiceRegistration, ServiceStatus};
use crate::observability::health::{HealthProbe, HttpHealthProbe, ProbeResult};
use crate::observability::metrics;

/// Reason reported for ids the registry does not know
pub const NOT_REGISTERED_REASON: &str = "Service not registered";

/// Reason reported when the last probe is older than the staleness threshold
pub const OVERDUE_REASON: &str = "Health check overdue";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Registry change notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A service was registered (or re-registered under a new id)
    Registered { service_id: String, name: String },
    /// A service was removed, explicitly or by re-registration of its name
    Deregistered { service_id: String, name: String },
    /// A health update changed the stored status
    StatusChanged {
        service_id: String,
        name: String,
        old_status: ServiceStatus,
        new_status: ServiceStatus,
    },
}

/// Type alias for registry event receiver
pub type RegistryEventReceiver = broadcast::Receiver<RegistryEvent>;

/// Registry counts by effective status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_services: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<String, Arc<ServiceRegistration>>,
    names: HashMap<String, String>,
}

/// Service registry with an attached health monitor
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
    config: RegistryConfig,
    probe: Arc<dyn HealthProbe>,
    event_sender: broadcast::Sender<RegistryEvent>,
    shutdown: CancellationToken,
    monitor_started: AtomicBool,
}

impl ServiceRegistry {
    /// Create a registry probing services with `probe`
    pub fn new(config: RegistryConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: RwLock::new(RegistryState::default()),
            config,
            probe,
            event_sender,
            shutdown: CancellationToken::new(),
            monitor_started: AtomicBool::new(false),
        }
    }

    /// Create a registry using HTTP GET probes
    pub fn with_http_probe(config: RegistryConfig) -> Self {
        Self::new(config, Arc::new(HttpHealthProbe::new()))
    }

    /// Create a registry whose HTTP probes go through `client`
    pub fn with_http_client(config: RegistryConfig, client: reqwest::Client) -> Self {
        Self::new(config, Arc::new(HttpHealthProbe::with_client(client)))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a service and return its id
    ///
    /// A previous registration with the same name is removed entirely. The new
    /// record is probed once before this returns; a failed probe only sets the
    /// initial status to `Down`.
    pub async fn register_service(&self, mut registration: ServiceRegistration) -> GatewayResult<String> {
        validate_registration(&registration)?;

        if registration.service_id.is_empty() {
            registration.service_id = Uuid::new_v4().to_string();
        }
        registration.status = ServiceStatus::Unknown;
        registration.last_health_check = None;

        let service_id = registration.service_id.clone();
        let name = registration.name.clone();
        let health_check_url = registration.health_check_url.clone();

        let replaced = {
            let mut state = self.state.write();

            let mut replaced = None;
            if let Some(old_id) = state.names.insert(name.clone(), service_id.clone()) {
                if old_id != service_id {
                    replaced = state.records.remove(&old_id);
                }
            }

            // A caller-supplied id may already belong to a record under another name
            if let Some(previous) = state.records.insert(service_id.clone(), Arc::new(registration)) {
                if previous.name != name && state.names.get(&previous.name) == Some(&service_id) {
                    state.names.remove(&previous.name);
                }
            }

            replaced
        };

        if let Some(old) = replaced {
            info!(
                service = %name,
                old_service_id = %old.service_id,
                new_service_id = %service_id,
                "Replacing existing registration"
            );
            let _ = self.event_sender.send(RegistryEvent::Deregistered {
                service_id: old.service_id.clone(),
                name: old.name.clone(),
            });
        }

        info!(service = %name, service_id = %service_id, "Service registered");
        let _ = self.event_sender.send(RegistryEvent::Registered {
            service_id: service_id.clone(),
            name: name.clone(),
        });

        let result = self.probe.check(&health_check_url, self.config.probe_timeout).await;
        self.apply_probe_result(&service_id, &name, &result);

        Ok(service_id)
    }

    /// Remove a service by id; `false` if the id is unknown
    pub fn deregister_service(&self, service_id: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            let removed = state.records.remove(service_id);
            if let Some(record) = &removed {
                if state.names.get(&record.name).map(String::as_str) == Some(service_id) {
                    state.names.remove(&record.name);
                }
            }
            removed
        };

        match removed {
            Some(record) => {
                info!(service = %record.name, service_id = %service_id, "Service deregistered");
                let _ = self.event_sender.send(RegistryEvent::Deregistered {
                    service_id: service_id.to_string(),
                    name: record.name.clone(),
                });
                true
            }
            None => {
                debug!(service_id = %service_id, "Deregistration of unknown service ignored");
                false
            }
        }
    }

    /// Look up the active registration for a service name
    pub fn get_service(&self, name: &str) -> Option<ServiceRegistration> {
        let state = self.state.read();
        state
            .names
            .get(name)
            .and_then(|id| state.records.get(id))
            .map(|record| ServiceRegistration::clone(record))
    }

    pub fn get_service_by_id(&self, service_id: &str) -> Option<ServiceRegistration> {
        self.state
            .read()
            .records
            .get(service_id)
            .map(|record| ServiceRegistration::clone(record))
    }

    /// All registrations, sorted by name
    pub fn list_services(&self) -> Vec<ServiceRegistration> {
        let mut services: Vec<ServiceRegistration> = self
            .state
            .read()
            .records
            .values()
            .map(|record| ServiceRegistration::clone(record))
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Effective status of a service, with a reason when it is not the stored one
    ///
    /// Unknown ids are `Down`. A record whose last probe is older than the staleness
    /// threshold is `Degraded` regardless of its stored status. A record that was
    /// never probed reports its stored status.
    pub fn get_service_status(&self, service_id: &str) -> (ServiceStatus, Option<String>) {
        let state = self.state.read();
        match state.records.get(service_id) {
            Some(record) => self.effective_status(record),
            None => (ServiceStatus::Down, Some(NOT_REGISTERED_REASON.to_string())),
        }
    }

    fn effective_status(&self, record: &ServiceRegistration) -> (ServiceStatus, Option<String>) {
        if let Some(last_check) = record.last_health_check {
            // A timestamp in the future yields Err and counts as fresh
            if let Ok(age) = Utc::now().signed_duration_since(last_check).to_std() {
                if age > self.config.staleness_threshold {
                    return (ServiceStatus::Degraded, Some(OVERDUE_REASON.to_string()));
                }
            }
        }
        (record.status, None)
    }

    /// Store a health outcome for a service
    ///
    /// Status and timestamp are replaced together. Returns `false` if the id is
    /// unknown, e.g. the service was deregistered while its probe was in flight.
    pub fn record_health(&self, service_id: &str, status: ServiceStatus, checked_at: DateTime<Utc>) -> bool {
        let change = {
            let mut state = self.state.write();
            let Some(current) = state.records.get(service_id) else {
                return false;
            };

            let mut updated = ServiceRegistration::clone(current);
            let old_status = updated.status;
            updated.status = status;
            updated.last_health_check = Some(checked_at);
            let name = updated.name.clone();
            state.records.insert(service_id.to_string(), Arc::new(updated));

            (old_status != status).then_some((name, old_status))
        };

        if let Some((name, old_status)) = change {
            info!(
                service = %name,
                service_id = %service_id,
                old_status = %old_status,
                new_status = %status,
                "Service status changed"
            );
            let _ = self.event_sender.send(RegistryEvent::StatusChanged {
                service_id: service_id.to_string(),
                name,
                old_status,
                new_status: status,
            });
        }

        true
    }

    /// Probe one service now and record the outcome
    pub async fn probe_service(&self, service_id: &str) -> Option<ProbeResult> {
        let (name, health_check_url) = {
            let state = self.state.read();
            let record = state.records.get(service_id)?;
            (record.name.clone(), record.health_check_url.clone())
        };

        let result = self.probe.check(&health_check_url, self.config.probe_timeout).await;
        self.apply_probe_result(service_id, &name, &result);
        Some(result)
    }

    /// Probe every registered service concurrently, returning how many were probed
    pub async fn probe_all(&self) -> usize {
        let targets: Vec<String> = self.state.read().records.keys().cloned().collect();

        let probes = targets.iter().map(|service_id| self.probe_service(service_id));
        let results = join_all(probes).await;

        let failures = results
            .iter()
            .flatten()
            .filter(|result| !result.is_healthy())
            .count();
        debug!(probed = targets.len(), failures, "Health check round complete");

        targets.len()
    }

    fn apply_probe_result(&self, service_id: &str, name: &str, result: &ProbeResult) {
        metrics::record_probe(name, result.status);

        match &result.message {
            Some(message) => warn!(
                service = %name,
                service_id = %service_id,
                duration_ms = result.duration.as_millis() as u64,
                "Health check failed: {}", message
            ),
            None => debug!(
                service = %name,
                service_id = %service_id,
                duration_ms = result.duration.as_millis() as u64,
                "Health check passed"
            ),
        }

        self.record_health(service_id, result.status, result.checked_at);
    }

    /// Start the periodic health monitor
    ///
    /// The first round runs one interval after start, since every service is probed
    /// at registration. Once stopped, the monitor cannot be restarted on the same
    /// registry. Only one probe loop runs per registry: a second call returns a
    /// handle that completes when the monitor is stopped.
    pub fn start_health_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();

        if self.monitor_started.swap(true, Ordering::AcqRel) {
            warn!("Health monitor already running");
            return tokio::spawn(async move { shutdown.cancelled().await });
        }

        let registry = Arc::clone(self);
        let period = self.config.health_check_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(interval = ?period, "Health monitor started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.probe_all().await;
                    }
                }
            }
        })
    }

    /// Stop the health monitor after its current round
    pub fn stop_health_monitor(&self) {
        self.shutdown.cancel();
    }

    pub fn is_monitor_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Subscribe to registry change events
    pub fn subscribe(&self) -> RegistryEventReceiver {
        self.event_sender.subscribe()
    }

    /// Counts of registered services by effective status
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let mut stats = RegistryStats {
            total_services: state.records.len(),
            ..RegistryStats::default()
        };

        for record in state.records.values() {
            match self.effective_status(record).0 {
                ServiceStatus::Healthy => stats.healthy += 1,
                ServiceStatus::Degraded => stats.degraded += 1,
                ServiceStatus::Down => stats.down += 1,
                ServiceStatus::Unknown => stats.unknown += 1,
            }
        }

        stats
    }
}

fn validate_registration(registration: &ServiceRegistration) -> GatewayResult<()> {
    if registration.name.trim().is_empty() {
        return Err(GatewayError::validation("name", "service name must not be empty"));
    }
    validate_http_url("url", &registration.url)?;
    validate_http_url("health_check_url", &registration.health_check_url)?;

    for (name, endpoint) in &registration.endpoints {
        if endpoint.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(GatewayError::validation(
                format!("endpoints.{}.timeout", name),
                "timeout must be greater than zero",
            ));
        }
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> GatewayResult<()> {
    let url = Url::parse(value)
        .map_err(|e| GatewayError::validation(field, format!("invalid URL '{}': {}", value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(GatewayError::validation(
            field,
            format!("unsupported URL scheme '{}'", scheme),
        )),
    }
}
