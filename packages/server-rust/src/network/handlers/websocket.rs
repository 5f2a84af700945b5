//! WebSocket upgrade handler and per-connection session loop.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::debug;

use super::AppState;
use crate::network::{ConnectionHandle, OutboundMessage};

/// WebSocket sub-protocol advertised to clients.
pub const WAMP_SUBPROTOCOL: &str = "wamp";

/// Upgrades an HTTP connection to a WAMP session.
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_frame_size = state.config.connection.max_frame_size;
    ws.protocols([WAMP_SUBPROTOCOL])
        .max_message_size(max_frame_size)
        .on_upgrade(move |socket| run_session(socket, state))
}

/// Drives one connection until either side closes it.
///
/// Inbound text frames are handed to the router in arrival order; frames the
/// router queued on the connection's channel are written out as they come.
async fn run_session(mut socket: WebSocket, state: AppState) {
    let capacity = state.config.connection.outbound_channel_capacity;
    let (handle, mut rx) = ConnectionHandle::new(capacity);
    let conn = handle.id;
    state.router.on_open(handle);

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    // Failures are logged by the router and never end the session.
                    if let Err(err) = state.router.handle_text(conn, text.as_str()) {
                        debug!(conn_id = %conn, error = %err, "frame not routed");
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(conn_id = %conn, "binary frame ignored");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(err)) => {
                    debug!(conn_id = %conn, error = %err, "websocket read failed");
                    break;
                }
            },
            outbound = rx.recv() => match outbound {
                Some(OutboundMessage::Text(text)) => {
                    if let Err(err) = socket.send(Message::Text(text.into())).await {
                        debug!(conn_id = %conn, error = %err, "websocket write failed");
                        break;
                    }
                }
                Some(OutboundMessage::Close(reason)) => {
                    let frame = reason.map(|reason| CloseFrame {
                        code: close_code::AWAY,
                        reason: reason.into(),
                    });
                    let _ = socket.send(Message::Close(frame)).await;
                    break;
                }
                None => break,
            },
        }
    }

    state.router.on_close(conn);
}
