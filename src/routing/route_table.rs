//! Static (service, endpoint) route table.
//!
//! Backends may register without an endpoint table; the platform routes loaded from
//! configuration fill the gap. A service's own endpoint always wins over this table.

use axum::http::Method;
use std::collections::HashMap;
use std::str::FromStr;

use crate::core::config::RouteDefinition;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::ServiceEndpoint;

/// Immutable lookup table built once at startup
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(String, String), ServiceEndpoint>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from configured route definitions
    ///
    /// Methods are case-insensitive. A later definition for the same
    /// (service, endpoint) pair replaces an earlier one.
    pub fn from_definitions(definitions: &[RouteDefinition]) -> GatewayResult<Self> {
        let mut table = Self::new();

        for definition in definitions {
            let method = Method::from_str(&definition.method.to_uppercase()).map_err(|_| {
                GatewayError::config(format!(
                    "Invalid method '{}' for route {}/{}",
                    definition.method, definition.service, definition.endpoint
                ))
            })?;

            let mut endpoint = ServiceEndpoint::new(method, definition.path.clone());
            endpoint.timeout = definition.timeout;

            table.insert(&definition.service, &definition.endpoint, endpoint);
        }

        Ok(table)
    }

    pub fn insert(&mut self, service: &str, endpoint: &str, definition: ServiceEndpoint) {
        self.routes
            .insert((service.to_string(), endpoint.to_string()), definition);
    }

    pub fn get(&self, service: &str, endpoint: &str) -> Option<&ServiceEndpoint> {
        self.routes.get(&(service.to_string(), endpoint.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
