//! # Admin Module
//!
//! This module provides administrative endpoints for the service registry and the
//! served API versions:
//! - Service registration, deregistration and status
//! - API version listing, deprecation and sunset scheduling
//!
//! ## Security Considerations
//! Admin endpoints modify the gateway's routing behavior and should only be reachable
//! from trusted networks.

pub mod service_management;
pub mod version_management;

pub use service_management::{ServiceManagementRouter, ServiceManagementState, ServiceView};
pub use version_management::{VersionManagementRouter, VersionManagementState};
