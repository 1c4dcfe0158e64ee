//! # HTTP / WebSocket Surface
//!
//! Thin adapters over the engine: synchronous scoring, dashboard
//! aggregates, collusion snapshots, operational introspection and the
//! real-time alert socket. The core never depends on this layer.

mod routes;
mod websocket;

use std::sync::Arc;

use axum::Router;
use parking_lot::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analyzer::{AnalyzerStatus, CollusionCache};
use crate::config::EngineConfig;
use crate::engine::RiskEngine;
use crate::metrics::EngineMetrics;
use crate::store::GraphStore;
use crate::stream::TxStream;

/// Shared state handed to every handler.
pub struct ApiState {
    pub engine: Arc<RiskEngine>,
    pub store: Arc<dyn GraphStore>,
    pub stream: Arc<dyn TxStream>,
    pub metrics: Arc<EngineMetrics>,
    pub collusion: Arc<CollusionCache>,
    pub analyzer_status: Arc<RwLock<AnalyzerStatus>>,
    pub config: Arc<EngineConfig>,
}

/// Build the full router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(routes::routes(state.clone()))
        .merge(websocket::routes(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
