//! # Routing
//!
//! Resolution of (service, endpoint) pairs and proxying to backend services.

pub mod route_table;
pub mod router;

pub use route_table::RouteTable;
pub use router::{build_http_client, join_url, RequestRouter, ResolvedRoute};
