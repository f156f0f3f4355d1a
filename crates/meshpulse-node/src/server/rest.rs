//! REST API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use meshpulse_core::{Link, Node, NodeId};
use meshpulse_output::nodelist::{transform, NodeList};
use meshpulse_state::{globals, SiteGlobals};

use super::AppState;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Collector summary
#[derive(Debug, Serialize)]
pub struct Info {
    pub version: &'static str,
    pub nodes: usize,
    pub online: usize,
    pub uptime_seconds: u64,
}

pub async fn info(State(state): State<Arc<AppState>>) -> Json<Info> {
    let (nodes, online) = {
        let view = state.nodes.read();
        let online = view.iter().filter(|(_, node)| node.online).count();
        (view.len(), online)
    };
    Json(Info {
        version: env!("CARGO_PKG_VERSION"),
        nodes,
        online,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// All nodes in nodelist form
pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<NodeList> {
    let snapshot = state.nodes.read().to_vec();
    Json(transform(&snapshot, Utc::now()))
}

/// Full record of one node
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Node>, StatusCode> {
    let id = NodeId::new(id).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.nodes.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Links derived from one node's neighbours
pub async fn get_links(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Link>>, StatusCode> {
    let id = NodeId::new(id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let view = state.nodes.read();
    let node = view.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(view.links(node)))
}

/// Current aggregate per configured site/domain
pub async fn get_globals(State(state): State<Arc<AppState>>) -> Json<Vec<SiteGlobals>> {
    let view = state.nodes.read();
    Json(globals::compute(&view, &state.sites_domains))
}
