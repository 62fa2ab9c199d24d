//! # API Version Negotiation
//!
//! Resolves which API version a request targets from three signals (a request header,
//! a `/v<N>/` or `/api/v<N>/` path prefix, and a `version`/`v` query parameter), checks
//! that the version is still served, and stamps version metadata on responses.
//!
//! ## Rust Concepts Used
//!
//! - `VersionNegotiationStrategy` is a closed enum: each variant owns exactly one precedence
//!   order and the compiler checks every `match` over it
//! - `parking_lot::RwLock` guards the version table so administrative changes
//!   (deprecation, sunset) never race with negotiation reads
//! - `OnceLock` compiles each extraction regex once per process

use axum::http::header::{HeaderName, HeaderValue, LINK, WARNING};
use axum::http::{HeaderMap, Uri};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::core::config::VersioningConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::Payload;
use crate::versioning::transform::{TransformerRegistry, VersionTransformer};

pub const API_VERSION_HEADER: &str = "x-api-version";
pub const API_LATEST_VERSION_HEADER: &str = "x-api-latest-version";
pub const SUNSET_HEADER: &str = "sunset";

/// One served API version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    /// Version identifier, e.g. "1"
    pub version: String,

    #[serde(default)]
    pub deprecated: bool,

    /// Once past, the version is no longer supported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunset_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl ApiVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            deprecated: false,
            sunset_date: None,
            documentation_url: None,
        }
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn with_sunset(mut self, sunset_date: DateTime<Utc>) -> Self {
        self.sunset_date = Some(sunset_date);
        self
    }

    pub fn with_documentation(mut self, url: impl Into<String>) -> Self {
        self.documentation_url = Some(url.into());
        self
    }

    /// Whether the sunset date has passed at `now`
    pub fn is_sunset_at(&self, now: DateTime<Utc>) -> bool {
        self.sunset_date.map(|sunset| now > sunset).unwrap_or(false)
    }

    /// Why this version is not served at `now`, if it is not
    pub fn unsupported_reason_at(&self, now: DateTime<Utc>) -> Option<String> {
        if self.deprecated {
            Some(format!("API version {} is deprecated", self.version))
        } else if self.is_sunset_at(now) {
            Some(format!("API version {} has been sunset", self.version))
        } else {
            None
        }
    }
}

/// Where a version candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Header,
    Path,
    Query,
}

/// Precedence policy among version signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionNegotiationStrategy {
    /// header > path > query
    HeaderFirst,
    /// path > header > query
    PathFirst,
    /// query > header > path
    QueryFirst,
}

impl VersionNegotiationStrategy {
    /// Order in which sources are consulted; the first one yielding a candidate wins
    pub fn precedence(&self) -> [VersionSource; 3] {
        match self {
            Self::HeaderFirst => [VersionSource::Header, VersionSource::Path, VersionSource::Query],
            Self::PathFirst => [VersionSource::Path, VersionSource::Header, VersionSource::Query],
            Self::QueryFirst => [VersionSource::Query, VersionSource::Header, VersionSource::Path],
        }
    }
}

impl Default for VersionNegotiationStrategy {
    fn default() -> Self {
        Self::HeaderFirst
    }
}

impl fmt::Display for VersionNegotiationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderFirst => write!(f, "header_first"),
            Self::PathFirst => write!(f, "path_first"),
            Self::QueryFirst => write!(f, "query_first"),
        }
    }
}

impl FromStr for VersionNegotiationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "header_first" | "header" => Ok(Self::HeaderFirst),
            "path_first" | "path" => Ok(Self::PathFirst),
            "query_first" | "query" => Ok(Self::QueryFirst),
            other => Err(format!("unknown negotiation strategy: {}", other)),
        }
    }
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[vV]?(\d+)(?:\.\d+)*$").expect("version header pattern"))
}

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:/api)?/v(\d+)(?:/|$)").expect("version path pattern"))
}

/// Normalise a captured major version ("01" -> "1")
fn normalise_major(digits: &str) -> Option<String> {
    digits.parse::<u64>().ok().map(|major| major.to_string())
}

/// Extract a version from a header value
///
/// Accepts `"1"`, `"v1"` and dotted numeric forms such as `"1.2.3"` (major component).
pub fn extract_from_header(value: &str) -> Option<String> {
    header_pattern()
        .captures(value.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|major| normalise_major(major.as_str()))
}

/// Extract a version from a `/v<N>/...` or `/api/v<N>/...` path prefix
pub fn extract_from_path(path: &str) -> Option<String> {
    path_pattern()
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|major| normalise_major(major.as_str()))
}

/// Extract a version from the `version` query parameter, then from `v`
pub fn extract_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    ["version", "v"].iter().find_map(|key| {
        pairs
            .iter()
            .filter(|(name, _)| name == key)
            .find_map(|(_, value)| extract_from_header(value))
    })
}

/// Compare version identifiers numerically component by component,
/// falling back to string order for non-numeric parts
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.trim_start_matches(['v', 'V']).split('.');
    let mut right = b.trim_start_matches(['v', 'V']).split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Resolves and validates API versions and annotates responses
pub struct VersionNegotiator {
    /// Known versions, kept sorted ascending
    versions: RwLock<Vec<ApiVersion>>,
    transformers: TransformerRegistry,
}

impl VersionNegotiator {
    /// Create a negotiator over a non-empty version table
    pub fn new(mut versions: Vec<ApiVersion>) -> GatewayResult<Self> {
        if versions.is_empty() {
            return Err(GatewayError::config("at least one API version is required"));
        }
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        versions.dedup_by(|a, b| a.version == b.version);

        Ok(Self {
            versions: RwLock::new(versions),
            transformers: TransformerRegistry::new(),
        })
    }

    pub fn from_config(config: &VersioningConfig) -> GatewayResult<Self> {
        Self::new(config.versions.clone())
    }

    /// The maximum configured version
    pub fn latest_version(&self) -> String {
        self.versions
            .read()
            .last()
            .map(|version| version.version.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the version table in ascending order
    pub fn versions(&self) -> Vec<ApiVersion> {
        self.versions.read().clone()
    }

    pub fn get_version(&self, version: &str) -> Option<ApiVersion> {
        self.versions
            .read()
            .iter()
            .find(|known| known.version == version)
            .cloned()
    }

    /// Resolve the version a request targets
    ///
    /// Returns the winning candidate and `true`, or the latest version and `false`
    /// when no source yields a candidate.
    pub fn negotiate_version(
        &self,
        uri: &Uri,
        accept_version_header: Option<&str>,
        strategy: VersionNegotiationStrategy,
    ) -> (String, bool) {
        for source in strategy.precedence() {
            let candidate = match source {
                VersionSource::Header => accept_version_header.and_then(extract_from_header),
                VersionSource::Path => extract_from_path(uri.path()),
                VersionSource::Query => extract_from_query(uri.query()),
            };

            if let Some(version) = candidate {
                debug!("Negotiated API version {} from {:?} ({})", version, source, strategy);
                return (version, true);
            }
        }

        (self.latest_version(), false)
    }

    /// Like [`negotiate_version`](Self::negotiate_version) but rejects unsupported versions
    pub fn negotiate_strict(
        &self,
        uri: &Uri,
        accept_version_header: Option<&str>,
        strategy: VersionNegotiationStrategy,
    ) -> GatewayResult<(String, bool)> {
        let (version, explicit) = self.negotiate_version(uri, accept_version_header, strategy);
        match self.unsupported_reason(&version, Utc::now()) {
            Some(reason) => Err(GatewayError::unsupported_version(version, reason)),
            None => Ok((version, explicit)),
        }
    }

    /// False if the version is unknown, deprecated or past its sunset date
    pub fn is_version_supported(&self, version: &str) -> bool {
        self.unsupported_reason(version, Utc::now()).is_none()
    }

    fn unsupported_reason(&self, version: &str, now: DateTime<Utc>) -> Option<String> {
        match self.get_version(version) {
            Some(known) => known.unsupported_reason_at(now),
            None => Some(format!("API version {} is not known", version)),
        }
    }

    /// Stamp version metadata on a response
    ///
    /// Every header is inserted with overwrite semantics, so repeated calls for the
    /// same version leave the headers unchanged.
    pub fn add_version_headers(&self, headers: &mut HeaderMap, version: &str) {
        let latest = self.latest_version();
        insert_header(headers, HeaderName::from_static(API_VERSION_HEADER), version);
        insert_header(headers, HeaderName::from_static(API_LATEST_VERSION_HEADER), &latest);

        let Some(known) = self.get_version(version) else {
            return;
        };

        if known.deprecated {
            let warning = format!(
                "299 - \"API version {} is deprecated; latest version is {}\"",
                known.version, latest
            );
            insert_header(headers, WARNING, &warning);
        }

        if let Some(sunset) = known.sunset_date {
            let sunset = sunset.to_rfc3339_opts(SecondsFormat::Secs, true);
            insert_header(headers, HeaderName::from_static(SUNSET_HEADER), &sunset);
        }

        if let Some(url) = &known.documentation_url {
            insert_header(headers, LINK, &format!("<{}>; rel=\"deprecation\"", url));
        }
    }

    /// Mark or unmark a version as deprecated
    pub fn deprecate_version(&self, version: &str, deprecated: bool) -> GatewayResult<()> {
        self.update_version(version, |known| known.deprecated = deprecated)
    }

    /// Set or clear the sunset date of a version
    pub fn set_sunset_date(&self, version: &str, sunset_date: Option<DateTime<Utc>>) -> GatewayResult<()> {
        self.update_version(version, |known| known.sunset_date = sunset_date)
    }

    fn update_version<F>(&self, version: &str, update: F) -> GatewayResult<()>
    where
        F: FnOnce(&mut ApiVersion),
    {
        let mut versions = self.versions.write();
        let known = versions
            .iter_mut()
            .find(|known| known.version == version)
            .ok_or_else(|| GatewayError::unsupported_version(version, "version is not known"))?;
        update(known);
        Ok(())
    }

    /// Register the payload adapter between a client version and a backend version
    ///
    /// One adapter serves both directions: its request hook runs on the way to the
    /// backend and its response hook on the way back.
    pub fn register_transformer(&self, client_version: &str, backend_version: &str, transformer: Arc<dyn VersionTransformer>) {
        self.transformers.register(client_version, backend_version, transformer);
    }

    /// Whether a payload adapter applies between these two versions
    pub fn has_transformer(&self, client_version: &str, backend_version: &str) -> bool {
        client_version != backend_version && self.transformers.get(client_version, backend_version).is_some()
    }

    /// Adapt a request payload written against `from` for a backend speaking `to`
    pub fn transform_request_for_version(&self, payload: Payload, from: &str, to: &str) -> GatewayResult<Payload> {
        match self.transformers.get(from, to) {
            Some(transformer) if from != to => transformer.transform_request(payload),
            _ => Ok(payload),
        }
    }

    /// Adapt a response payload produced under `from` for a client expecting `to`
    pub fn transform_response_for_version(&self, payload: Payload, from: &str, to: &str) -> GatewayResult<Payload> {
        match self.transformers.get(to, from) {
            Some(transformer) if from != to => transformer.transform_response(payload),
            _ => Ok(payload),
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => warn!("Skipping invalid value for header {}: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn negotiator() -> VersionNegotiator {
        VersionNegotiator::new(vec![ApiVersion::new("2"), ApiVersion::new("1")]).unwrap()
    }

    #[test]
    fn test_header_extraction() {
        assert_eq!(extract_from_header("v1").as_deref(), Some("1"));
        assert_eq!(extract_from_header("1").as_deref(), Some("1"));
        assert_eq!(extract_from_header("1.2.3").as_deref(), Some("1"));
        assert_eq!(extract_from_header(" V2 ").as_deref(), Some("2"));
        assert_eq!(extract_from_header("invalid"), None);
        assert_eq!(extract_from_header(""), None);
        assert_eq!(extract_from_header("v"), None);
        assert_eq!(extract_from_header("1.x"), None);
    }

    #[test]
    fn test_path_extraction() {
        assert_eq!(extract_from_path("/v1/route/svc/ep").as_deref(), Some("1"));
        assert_eq!(extract_from_path("/api/v3/users").as_deref(), Some("3"));
        assert_eq!(extract_from_path("/v2").as_deref(), Some("2"));
        assert_eq!(extract_from_path("/route/svc/ep"), None);
        assert_eq!(extract_from_path("/version/1"), None);
        assert_eq!(extract_from_path("/users/v2/"), None);
    }

    #[test]
    fn test_query_extraction() {
        assert_eq!(extract_from_query(Some("version=2")).as_deref(), Some("2"));
        assert_eq!(extract_from_query(Some("v=v3")).as_deref(), Some("3"));
        assert_eq!(extract_from_query(Some("v=1&version=2")).as_deref(), Some("2"));
        assert_eq!(extract_from_query(Some("version=bogus&v=1")).as_deref(), Some("1"));
        assert_eq!(extract_from_query(Some("page=1")), None);
        assert_eq!(extract_from_query(None), None);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("10", "9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("v2", "2"), Ordering::Equal);
    }

    #[test]
    fn test_latest_is_maximum() {
        let negotiator =
            VersionNegotiator::new(vec![ApiVersion::new("10"), ApiVersion::new("9"), ApiVersion::new("2")]).unwrap();
        assert_eq!(negotiator.latest_version(), "10");
        assert!(VersionNegotiator::new(Vec::new()).is_err());
    }

    #[test]
    fn test_precedence_orders() {
        assert_eq!(
            VersionNegotiationStrategy::HeaderFirst.precedence(),
            [VersionSource::Header, VersionSource::Path, VersionSource::Query]
        );
        assert_eq!(
            VersionNegotiationStrategy::PathFirst.precedence(),
            [VersionSource::Path, VersionSource::Header, VersionSource::Query]
        );
        assert_eq!(
            VersionNegotiationStrategy::QueryFirst.precedence(),
            [VersionSource::Query, VersionSource::Header, VersionSource::Path]
        );
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "header_first".parse::<VersionNegotiationStrategy>(),
            Ok(VersionNegotiationStrategy::HeaderFirst)
        );
        assert_eq!(
            "PATH-FIRST".parse::<VersionNegotiationStrategy>(),
            Ok(VersionNegotiationStrategy::PathFirst)
        );
        assert_eq!(
            "query".parse::<VersionNegotiationStrategy>(),
            Ok(VersionNegotiationStrategy::QueryFirst)
        );
        assert!("random".parse::<VersionNegotiationStrategy>().is_err());
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let negotiator = negotiator();
        assert!(negotiator.is_version_supported("1"));
        assert!(!negotiator.is_version_supported("7"));
    }

    #[test]
    fn test_sunset_reason() {
        let now = Utc::now();
        let version = ApiVersion::new("1").with_sunset(now - ChronoDuration::days(1));
        assert!(version.is_sunset_at(now));
        assert!(version.unsupported_reason_at(now).unwrap().contains("sunset"));

        let future = ApiVersion::new("1").with_sunset(now + ChronoDuration::days(1));
        assert!(future.unsupported_reason_at(now).is_none());
    }

    #[test]
    fn test_headers_for_unknown_version() {
        let negotiator = negotiator();
        let mut headers = HeaderMap::new();
        negotiator.add_version_headers(&mut headers, "9");
        assert_eq!(headers.get(API_VERSION_HEADER).unwrap(), "9");
        assert_eq!(headers.get(API_LATEST_VERSION_HEADER).unwrap(), "2");
        assert!(headers.get(WARNING).is_none());
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_one_adapter_serves_both_directions() {
        use crate::versioning::transform::FieldRenameTransformer;
        use serde_json::json;

        let negotiator = negotiator();
        negotiator.register_transformer("1", "2", Arc::new(FieldRenameTransformer::new().rename("repo", "repository")));

        let request = negotiator
            .transform_request_for_version(Payload::Json(json!({"repo": "gw"})), "1", "2")
            .unwrap();
        assert_eq!(request, Payload::Json(json!({"repository": "gw"})));

        let response = negotiator
            .transform_response_for_version(Payload::Json(json!({"repository": "gw"})), "2", "1")
            .unwrap();
        assert_eq!(response, Payload::Json(json!({"repo": "gw"})));

        // No adapter registered for this pair
        let untouched = negotiator
            .transform_request_for_version(Payload::Json(json!({"repo": "gw"})), "2", "1")
            .unwrap();
        assert_eq!(untouched, Payload::Json(json!({"repo": "gw"})));

        assert!(negotiator.has_transformer("1", "2"));
        assert!(!negotiator.has_transformer("2", "1"));
        assert!(!negotiator.has_transformer("2", "2"));
    }
}
