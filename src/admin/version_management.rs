//! # Version Management Module
//!
//! Endpoints exposing the configured API versions and letting operators deprecate a
//! version or schedule its sunset at runtime.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, patch},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::error::{GatewayError, GatewayResult};
use crate::versioning::negotiator::{ApiVersion, VersionNegotiationStrategy, VersionNegotiator};

/// Version management state
#[derive(Clone)]
pub struct VersionManagementState {
    pub negotiator: Arc<VersionNegotiator>,
    pub strategy: VersionNegotiationStrategy,
}

/// Version management router
pub struct VersionManagementRouter;

impl VersionManagementRouter {
    pub fn create_router(state: VersionManagementState) -> Router {
        Router::new()
            .route("/versions", get(list_versions))
            .route("/versions/:version", patch(update_version))
            .with_state(state)
    }
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub latest: String,
    pub strategy: VersionNegotiationStrategy,
    pub versions: Vec<ApiVersion>,
}

/// Partial update of a version
///
/// `sunset_date` distinguishes absent (unchanged) from `null` (cleared).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateVersionRequest {
    pub deprecated: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub sunset_date: Option<Option<DateTime<Utc>>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
}

async fn list_versions(State(state): State<VersionManagementState>) -> Json<VersionsResponse> {
    Json(VersionsResponse {
        latest: state.negotiator.latest_version(),
        strategy: state.strategy,
        versions: state.negotiator.versions(),
    })
}

async fn update_version(
    State(state): State<VersionManagementState>,
    Path(version): Path<String>,
    Json(request): Json<UpdateVersionRequest>,
) -> GatewayResult<Json<ApiVersion>> {
    let negotiator = &state.negotiator;

    if let Some(deprecated) = request.deprecated {
        negotiator.deprecate_version(&version, deprecated)?;
        info!(version = %version, deprecated, "Updated version deprecation");
    }

    if let Some(sunset_date) = request.sunset_date {
        negotiator.set_sunset_date(&version, sunset_date)?;
        info!(version = %version, sunset = ?sunset_date, "Updated version sunset date");
    }

    negotiator
        .get_version(&version)
        .map(Json)
        .ok_or_else(|| GatewayError::unsupported_version(version, "version is not known"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_distinguishes_null() {
        let absent: UpdateVersionRequest = serde_json::from_str(r#"{"deprecated": true}"#).unwrap();
        assert_eq!(absent.deprecated, Some(true));
        assert!(absent.sunset_date.is_none());

        let cleared: UpdateVersionRequest = serde_json::from_str(r#"{"sunset_date": null}"#).unwrap();
        assert_eq!(cleared.sunset_date, Some(None));

        let set: UpdateVersionRequest =
            serde_json::from_str(r#"{"sunset_date": "2027-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(set.sunset_date, Some(Some(_))));
    }
}
