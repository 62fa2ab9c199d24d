//! # Service Management Module
//!
//! This module provides the HTTP endpoints backend services use to register and
//! deregister themselves, plus read-only views of the registry:
//! - Service registration (`POST /services`)
//! - Service deregistration by id (`DELETE /services/:service_id`)
//! - Lookup by name and listing, with the effective health status
//! - Effective status by id and on-demand health checks
//!
//! ## Security Considerations
//! These endpoints modify the service registry and should only be reachable from the
//! platform's internal network.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{ServiceRegistration, ServiceStatus};
use crate::discovery::registry::{RegistryStats, ServiceRegistry};

/// Service management state
#[derive(Clone)]
pub struct ServiceManagementState {
    pub service_registry: Arc<ServiceRegistry>,
}

/// Service management router
pub struct ServiceManagementRouter;

impl ServiceManagementRouter {
    /// Create the service management router with all endpoints
    ///
    /// `GET /services/:key` looks up by name while `DELETE /services/:key` takes an id,
    /// matching how backends address themselves in each case.
    pub fn create_router(state: ServiceManagementState) -> Router {
        Router::new()
            .route("/services", get(list_services).post(register_service))
            .route("/services/:key", get(get_service).delete(deregister_service))
            .route("/services/:key/status", get(get_service_status))
            .route("/services/:key/health-check", post(check_service_health))
            .with_state(state)
    }
}

/// A registration together with its effective status
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub registration: ServiceRegistration,
    pub effective_status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

impl ServiceView {
    fn from_registry(registry: &ServiceRegistry, registration: ServiceRegistration) -> Self {
        let (effective_status, status_reason) = registry.get_service_status(&registration.service_id);
        Self {
            registration,
            effective_status,
            status_reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListServicesResponse {
    pub services: Vec<ServiceView>,
    pub total_services: usize,
    pub stats: RegistryStats,
}

#[derive(Debug, Serialize)]
pub struct RegisterServiceResponse {
    pub service_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatusResponse {
    pub service_id: String,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// List all registered services
async fn list_services(State(state): State<ServiceManagementState>) -> Json<ListServicesResponse> {
    let registry = &state.service_registry;
    let services: Vec<ServiceView> = registry
        .list_services()
        .into_iter()
        .map(|registration| ServiceView::from_registry(registry, registration))
        .collect();

    Json(ListServicesResponse {
        total_services: services.len(),
        services,
        stats: registry.stats(),
    })
}

/// Register a backend service
async fn register_service(
    State(state): State<ServiceManagementState>,
    Json(registration): Json<ServiceRegistration>,
) -> GatewayResult<impl IntoResponse> {
    let name = registration.name.clone();
    let service_id = state.service_registry.register_service(registration).await?;

    info!(service = %name, service_id = %service_id, "Registered service via admin API");

    Ok((
        StatusCode::CREATED,
        Json(RegisterServiceResponse {
            service_id,
            message: "Service registered successfully".to_string(),
        }),
    ))
}

/// Get a service by name
async fn get_service(
    State(state): State<ServiceManagementState>,
    Path(name): Path<String>,
) -> GatewayResult<Json<ServiceView>> {
    let registry = &state.service_registry;
    let registration = registry
        .get_service(&name)
        .ok_or_else(|| GatewayError::unknown_service(&name))?;

    Ok(Json(ServiceView::from_registry(registry, registration)))
}

/// Deregister a service by id
async fn deregister_service(
    State(state): State<ServiceManagementState>,
    Path(service_id): Path<String>,
) -> GatewayResult<StatusCode> {
    if state.service_registry.deregister_service(&service_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::unknown_service(service_id))
    }
}

/// Effective status of a service by id
///
/// Unknown ids are answered with `down` rather than 404.
async fn get_service_status(
    State(state): State<ServiceManagementState>,
    Path(service_id): Path<String>,
) -> Json<ServiceStatusResponse> {
    let (status, reason) = state.service_registry.get_service_status(&service_id);
    Json(ServiceStatusResponse {
        service_id,
        status,
        reason,
    })
}

/// Probe a service now and return its refreshed status
async fn check_service_health(
    State(state): State<ServiceManagementState>,
    Path(service_id): Path<String>,
) -> GatewayResult<Json<ServiceStatusResponse>> {
    let registry = &state.service_registry;
    registry
        .probe_service(&service_id)
        .await
        .ok_or_else(|| GatewayError::unknown_service(&service_id))?;

    let (status, reason) = registry.get_service_status(&service_id);
    Ok(Json(ServiceStatusResponse {
        service_id,
        status,
        reason,
    }))
}
