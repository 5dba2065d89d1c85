//! Per-connection WebSocket task.
//!
//! One task per admitted socket multiplexes the client's inbound frames
//! with the connection's outbound queue. Inbound frames are handled one
//! at a time, so a client's messages are routed in arrival order.
//!
//! The task ends, dropping the transport, when either side closes or when
//! the registry fires the connection's shutdown token. Every write races
//! that token, so a peer that stopped reading cannot keep an evicted
//! connection open.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::auth::AdmittedConnection;
use crate::domain::{ConnectionId, OutboundFrame};
use crate::error::AdmissionError;

/// How long a final close frame may take to reach the peer.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocket, Message>;

/// Registers an admitted socket and runs its read/write loop until either
/// side closes or the connection is evicted, then unregisters it.
pub async fn run_connection(socket: WebSocket, admitted: AdmittedConnection, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel(state.config.ws_outbound_buffer.max(1));
    let shutdown = CancellationToken::new();

    let AdmittedConnection {
        session_id,
        principal,
    } = admitted;
    let user_id = principal.user_id;
    let connection_id = state
        .registry
        .register(principal, session_id, out_tx, shutdown.clone())
        .await;

    // A logout or account deletion between admission and registration
    // would have missed this connection.
    if let Err(err) = state.auth_gate.revalidate(session_id, user_id).await {
        state.registry.unregister(connection_id).await;
        tracing::info!(%connection_id, %user_id, error = %err, "admission revoked before start");
        send_close(&mut ws_tx, err.close_code(), err.close_reason()).await;
        return;
    }
    tracing::info!(%connection_id, %user_id, "ws connection admitted");

    loop {
        tokio::select! {
            biased;
            // Evicted or unregistered.
            () = shutdown.cancelled() => break,
            // Frame queued by the router, the heartbeat, or an eviction.
            // `None` means the registry dropped this connection.
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                let closing = matches!(frame, OutboundFrame::Close { .. });
                let sent = tokio::select! {
                    sent = send_frame(&mut ws_tx, frame) => Some(sent),
                    () = shutdown.cancelled() => None,
                };
                let Some(sent) = sent else { break };
                if let Err(e) = sent {
                    tracing::debug!(%connection_id, error = %e, "ws send failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.router.on_message(connection_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        state.registry.mark_alive(connection_id).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(%connection_id, "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%connection_id, error = %e, "ws receive failed");
                        break;
                    }
                }
            }
        }
    }

    if shutdown.is_cancelled() {
        flush_close(&mut ws_tx, &mut out_rx, connection_id).await;
    }
    state.registry.unregister(connection_id).await;
    tracing::info!(%connection_id, %user_id, "ws connection closed");
}

/// Closes a socket whose admission failed. The connection never enters
/// the registry.
pub async fn reject_connection(socket: WebSocket, err: AdmissionError) {
    tracing::info!(error = %err, "ws admission rejected");
    let (mut ws_tx, _ws_rx) = socket.split();
    send_close(&mut ws_tx, err.close_code(), err.close_reason()).await;
}

/// Sends the close frame an eviction queued, if any. Other pending frames
/// are discarded.
async fn flush_close(
    ws_tx: &mut WsSink,
    out_rx: &mut mpsc::Receiver<OutboundFrame>,
    connection_id: ConnectionId,
) {
    while let Ok(frame) = out_rx.try_recv() {
        if let OutboundFrame::Close { code, reason } = frame {
            tracing::debug!(%connection_id, code, reason, "closing evicted connection");
            send_close(ws_tx, code, reason).await;
            return;
        }
    }
}

/// Best-effort close frame, bounded by [`CLOSE_GRACE`].
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &'static str) {
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    match tokio::time::timeout(CLOSE_GRACE, ws_tx.send(frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "close frame not sent"),
        Err(_) => tracing::debug!("peer not reading, dropping transport without close frame"),
    }
}

async fn send_frame(ws_tx: &mut WsSink, frame: OutboundFrame) -> Result<(), axum::Error> {
    let message = match frame {
        OutboundFrame::Text(json) => Message::text(json),
        OutboundFrame::Ping => Message::Ping(Default::default()),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    };
    ws_tx.send(message).await
}
