//! API version negotiation and version-specific payload adapters.

pub mod negotiator;
pub mod transform;

pub use negotiator::{
    compare_versions, extract_from_header, extract_from_path, extract_from_query, ApiVersion,
    VersionNegotiationStrategy, VersionNegotiator, VersionSource, API_LATEST_VERSION_HEADER,
    API_VERSION_HEADER, SUNSET_HEADER,
};
pub use transform::{FieldRenameTransformer, IdentityTransformer, TransformerRegistry, VersionTransformer};
