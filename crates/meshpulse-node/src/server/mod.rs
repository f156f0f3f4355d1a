//! Read-only status API
//!
//! Serves the live registry as JSON for dashboards and monitoring.

pub mod rest;

use axum::{routing::get, Router};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use meshpulse_state::Nodes;

/// State shared across handlers
pub struct AppState {
    /// Live registry
    pub nodes: Arc<Nodes>,
    /// Configured site → domains for the globals endpoint
    pub sites_domains: BTreeMap<String, Vec<String>>,
    /// Process start
    pub start_time: Instant,
}

impl AppState {
    pub fn new(nodes: Arc<Nodes>, sites_domains: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            nodes,
            sites_domains,
            start_time: Instant::now(),
        }
    }
}

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(rest::health))
        .route("/api/info", get(rest::info))
        .route("/api/nodes", get(rest::list_nodes))
        .route("/api/node/:id", get(rest::get_node))
        .route("/api/node/:id/links", get(rest::get_links))
        .route("/api/globals", get(rest::get_globals))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
