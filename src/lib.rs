//! # Pipeline Gateway Library - Core Library Crate
//!
//! The routing core of the pipeline platform's API gateway: a registry of backend
//! services with health monitoring, a request router that proxies named endpoints to
//! those services, and a version negotiator that resolves which API version each
//! request targets.
//!
//! ## Module Layout
//!
//! - `core`: error types, configuration and the shared data model
//! - `discovery`: the in-memory service registry and its health monitor
//! - `routing`: the static route table and the proxying request router
//! - `versioning`: API version negotiation and version-specific payload adapters
//! - `observability`: health probes, structured logging and metrics
//! - `gateway`: the Axum application and HTTP server
//! - `admin`: service and version management endpoints
//!
//! ### Re-exports
//! The most commonly used types are re-exported from the crate root, so users can
//! write `use pipeline_gateway::ServiceRegistry` instead of the full module path.

/// Core functionality including error types, configuration, and basic data structures
pub mod core;

/// Service registry and health monitor
pub mod discovery;

/// Request routing to registered backend services
pub mod routing;

/// API version negotiation
pub mod versioning;

/// Observability features: health probes, logging, metrics
pub mod observability;

/// Main gateway server implementation and HTTP handling
pub mod gateway;

/// Admin API for registry and version management
pub mod admin;

pub use crate::core::config::GatewayConfig;
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::core::types::{Payload, ServiceEndpoint, ServiceRegistration, ServiceResponse, ServiceStatus};
pub use crate::discovery::{RegistryEvent, ServiceRegistry};
pub use crate::gateway::{build_app, AppState, GatewayServer};
pub use crate::routing::{RequestRouter, RouteTable};
pub use crate::versioning::{ApiVersion, VersionNegotiationStrategy, VersionNegotiator};
