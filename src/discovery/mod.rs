//! # Service Discovery
//!
//! In-memory registration of backend services and their health.

pub mod registry;

pub use registry::{RegistryEvent, RegistryEventReceiver, RegistryStats, ServiceRegistry};
