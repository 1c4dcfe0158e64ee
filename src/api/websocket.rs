//! WebSocket alert fan-out.
//!
//! Clients connect to `/ws/alerts` and receive every scored record at or
//! above the medium threshold. The socket never emits a partial record; a
//! lagging client skips the overflowed messages and continues from the
//! live edge.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::ApiState;

pub fn routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws/alerts", get(ws_alerts))
        .with_state(state)
}

async fn ws_alerts(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let mut rx = state.engine.alerts().subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(
        subscribers = state.engine.alerts().subscriber_count(),
        "alert subscriber connected"
    );

    loop {
        tokio::select! {
            alert = rx.recv() => {
                match alert {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(payload) => payload,
                            Err(err) => {
                                warn!(%err, "alert serialization failed");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            debug!("alert subscriber went away");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "slow alert subscriber skipped messages");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    // Clients only keep the connection alive; payloads are ignored.
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    debug!("alert subscriber disconnected");
}
