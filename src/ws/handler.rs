//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use super::connection::{reject_connection, run_connection};
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// Admission runs on the upgrade request. A rejected attempt is still
/// upgraded so the client receives a close frame carrying the reason code
/// (1008), but it is never registered.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let admission = state.auth_gate.admit(&headers).await;
    let max_message_bytes = state.config.ws_max_message_bytes;

    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| async move {
            match admission {
                Ok(admitted) => run_connection(socket, admitted, state).await,
                Err(err) => reject_connection(socket, err).await,
            }
        })
}
