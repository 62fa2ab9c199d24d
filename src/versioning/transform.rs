//! Version-specific payload adapters.
//!
//! Negotiation never inspects payloads. When two API versions disagree on a payload
//! shape, an adapter for that version pair is registered here and the gateway runs it
//! on the way in and on the way out.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::GatewayResult;
use crate::core::types::Payload;

/// Adapts payloads between two API versions
///
/// Both hooks default to identity so an adapter only needs to implement the
/// direction it cares about.
pub trait VersionTransformer: Send + Sync {
    fn transform_request(&self, payload: Payload) -> GatewayResult<Payload> {
        Ok(payload)
    }

    fn transform_response(&self, payload: Payload) -> GatewayResult<Payload> {
        Ok(payload)
    }
}

/// Pass-through adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl VersionTransformer for IdentityTransformer {}

/// Renames top-level JSON fields
///
/// `request_renames` maps old-version field names to new-version names. Responses
/// apply the inverse mapping. Byte payloads pass through untouched.
#[derive(Debug, Default, Clone)]
pub struct FieldRenameTransformer {
    request_renames: HashMap<String, String>,
}

impl FieldRenameTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.request_renames.insert(from.into(), to.into());
        self
    }

    fn apply(payload: Payload, renames: &HashMap<String, String>) -> Payload {
        match payload {
            Payload::Json(Value::Object(object)) => {
                let renamed: Map<String, Value> = object
                    .into_iter()
                    .map(|(key, value)| match renames.get(&key) {
                        Some(new_key) => (new_key.clone(), value),
                        None => (key, value),
                    })
                    .collect();
                Payload::Json(Value::Object(renamed))
            }
            other => other,
        }
    }
}

impl VersionTransformer for FieldRenameTransformer {
    fn transform_request(&self, payload: Payload) -> GatewayResult<Payload> {
        Ok(Self::apply(payload, &self.request_renames))
    }

    fn transform_response(&self, payload: Payload) -> GatewayResult<Payload> {
        let inverse: HashMap<String, String> = self
            .request_renames
            .iter()
            .map(|(from, to)| (to.clone(), from.clone()))
            .collect();
        Ok(Self::apply(payload, &inverse))
    }
}

/// Adapters keyed by (from version, to version)
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: DashMap<(String, String), Arc<dyn VersionTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, from: &str, to: &str, transformer: Arc<dyn VersionTransformer>) {
        self.transformers
            .insert((from.to_string(), to.to_string()), transformer);
    }

    pub fn get(&self, from: &str, to: &str) -> Option<Arc<dyn VersionTransformer>> {
        self.transformers
            .get(&(from.to_string(), to.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_identity_transformer() {
        let payload = Payload::Json(json!({"name": "build"}));
        let out = IdentityTransformer.transform_request(payload.clone()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_field_rename_both_directions() {
        let transformer = FieldRenameTransformer::new().rename("repo", "repository");

        let request = transformer
            .transform_request(Payload::Json(json!({"repo": "gateway", "branch": "main"})))
            .unwrap();
        assert_eq!(request, Payload::Json(json!({"repository": "gateway", "branch": "main"})));

        let response = transformer
            .transform_response(Payload::Json(json!({"repository": "gateway"})))
            .unwrap();
        assert_eq!(response, Payload::Json(json!({"repo": "gateway"})));
    }

    #[test]
    fn test_bytes_untouched() {
        let transformer = FieldRenameTransformer::new().rename("a", "b");
        let payload = Payload::Bytes(Bytes::from_static(b"a=1"));
        assert_eq!(transformer.transform_request(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_registry_lookup_is_directional() {
        let registry = TransformerRegistry::new();
        registry.register("1", "2", Arc::new(IdentityTransformer));
        assert!(registry.get("1", "2").is_some());
        assert!(registry.get("2", "1").is_none());
        assert_eq!(registry.len(), 1);
    }
}
