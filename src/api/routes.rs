//! REST routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::types::{EngineError, TransactionRecord};

use super::ApiState;

pub fn routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/transaction", post(score_transaction))
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/viz/fraud-network", get(fraud_network))
        .route("/viz/device-sharing", get(device_sharing))
        .route("/detection/collusive", get(collusive_summary))
        .route("/analytics/status", get(analytics_status))
        .route("/db/counts", get(db_counts))
        .with_state(state)
}

/// Structured error body; scoring failures never silently succeed.
fn error_response(status: StatusCode, err: &EngineError) -> Response {
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "kind": match err {
                EngineError::InvalidInput(_) => "invalid_input",
                EngineError::TransientStore(_) => "transient_store",
                EngineError::DeadlineExceeded(_) => "deadline_exceeded",
                _ => "internal",
            },
        })),
    )
        .into_response()
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    let metrics = state.metrics.snapshot();
    let pending = state
        .stream
        .pending_count(&state.config.consumer_group)
        .await
        .unwrap_or(0);
    Json(json!({
        "status": "ok",
        "workers": {
            "processed": metrics.records_processed,
            "avg_latency_ms": metrics.avg_latency_ms,
            "tps": metrics.tps,
        },
        "stream": { "pending": pending },
        "analyzer": {
            "cycles": metrics.analyzer_cycles,
            "failures": metrics.analyzer_failures,
        },
    }))
}

/// Synchronous scoring: identical to the worker path minus the ACK step.
async fn score_transaction(
    State(state): State<Arc<ApiState>>,
    Json(record): Json<TransactionRecord>,
) -> Response {
    match state.engine.score(&record).await {
        Ok(scored) => Json(scored).into_response(),
        Err(err @ EngineError::InvalidInput(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &err)
        }
        Err(err @ EngineError::DeadlineExceeded(_)) => {
            warn!(%err, "synchronous scoring timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, &err)
        }
        Err(err) => {
            warn!(%err, "synchronous scoring failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err)
        }
    }
}

async fn dashboard_stats(State(state): State<Arc<ApiState>>) -> Response {
    match state
        .store
        .dashboard_aggregates(state.config.medium_threshold)
        .await
    {
        Ok(aggregates) => {
            let metrics = state.metrics.snapshot();
            Json(json!({
                "total_transactions": aggregates.total_transactions,
                "flagged_transactions": aggregates.flagged_transactions,
                "active_clusters": aggregates.active_clusters,
                "avg_risk_score": aggregates.avg_risk_score,
                "total_amount_processed": aggregates.total_amount,
                "avg_processing_time_ms": metrics.avg_latency_ms,
                "tps": metrics.tps,
                "records_dropped": metrics.records_dropped,
                "retries_exhausted": metrics.retries_exhausted,
                "alerts_dropped": metrics.alerts_dropped,
            }))
            .into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

#[derive(Deserialize)]
struct FraudNetworkQuery {
    #[serde(default = "default_min_risk")]
    min_risk: f64,
}

fn default_min_risk() -> f64 {
    30.0
}

async fn fraud_network(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<FraudNetworkQuery>,
) -> Response {
    match state.store.fraud_network(query.min_risk).await {
        Ok((nodes, edges)) => Json(json!({ "nodes": nodes, "edges": edges })).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

async fn device_sharing(State(state): State<Arc<ApiState>>) -> Response {
    match state.store.device_sharing(2).await {
        Ok(groups) => Json(json!({ "clusters": groups })).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

/// Point-in-time view of the collusion cache.
async fn collusive_summary(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    Json(state.collusion.load().summary())
}

async fn analytics_status(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    let status = state.analyzer_status.read().clone();
    Json(serde_json::to_value(status).unwrap_or_else(|_| json!({})))
}

async fn db_counts(State(state): State<Arc<ApiState>>) -> Response {
    match state.store.counts().await {
        Ok(counts) => Json(counts).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}
