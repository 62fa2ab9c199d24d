//! # Gateway HTTP Surface
//!
//! Axum application wiring the registry, router and version negotiator together.

pub mod server;

pub use server::{build_app, parse_route_path, AppState, GatewayServer};
