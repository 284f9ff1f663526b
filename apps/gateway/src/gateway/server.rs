//! WebSocket endpoint and per-connection event loop.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth;
use crate::events::{server_event, ClientFrame, ServerFrame};
use crate::AppState;

use super::handler;
use super::registry::ConnectionEntry;

/// Application-level close code for a failed handshake.
const CLOSE_AUTH_FAILED: u16 = 4004;

#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(default)]
    token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, params.token, state))
}

async fn handle_connection(socket: WebSocket, token: Option<String>, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The bearer token rides the upgrade request; verify before the connection
    // is registered anywhere. Failure is fatal for the connection and the
    // client gets nothing beyond the close frame.
    let user_id = match token
        .as_deref()
        .ok_or("Token missing")
        .and_then(|t| auth::verify_token(t, &state.config.jwt_secret))
    {
        Ok(user_id) => user_id,
        Err(reason) => {
            tracing::debug!(%reason, "socket authentication failed");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, reason).await;
            return;
        }
    };

    let conn_id = buzzchat_common::id::prefixed_ulid(buzzchat_common::id::prefix::CONNECTION);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();

    state.registry.insert(
        &user_id,
        ConnectionEntry {
            conn_id: conn_id.clone(),
            sender: out_tx,
            connected_at: chrono::Utc::now(),
        },
    );

    tracing::info!(
        %user_id,
        %conn_id,
        connected = state.registry.len(),
        "gateway connection registered"
    );

    // Initial presence sync: the user's per-group seen map.
    match state.presence.user_status(&user_id).await {
        Ok(status) => {
            let frame = ServerFrame::new(
                server_event::USER_GROUPS_STATUS,
                serde_json::json!({ "status": status }),
            );
            if ws_tx.send(Message::Text(frame.to_text().into())).await.is_err() {
                state.registry.remove(&user_id, &conn_id);
                return;
            }
        }
        Err(err) => {
            tracing::warn!(%user_id, %err, "initial presence sync failed");
        }
    }

    // Main loop: client frames in, fan-out frames out. Each iteration is
    // independent; a failed operation never takes the connection down.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame: ClientFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(err) => {
                                tracing::debug!(%user_id, %err, "dropping malformed frame");
                                continue;
                            }
                        };
                        if let Some(reply) = handler::dispatch(&state, &user_id, frame).await {
                            if ws_tx.send(Message::Text(reply.to_text().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%user_id, %conn_id, %err, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            frame = out_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if ws_tx.send(Message::Text(frame.to_text().into())).await.is_err() {
                            break;
                        }
                    }
                    // Channel closed: a newer connection for this user
                    // replaced the registry entry and our sender was dropped.
                    None => break,
                }
            }
        }
    }

    state.registry.remove(&user_id, &conn_id);
    tracing::info!(%user_id, %conn_id, "gateway connection closed");
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
