//! Per-connection session task.
//!
//! The handshake verifies the session token, registers with the hub, and
//! sends a `connected` frame. After that the task multiplexes: inbound
//! frames are parsed and dispatched, hub frames are written out, heartbeats
//! go both ways, and a silent peer is disconnected.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::protocol::{ClientFrame, ConnectedPayload, ErrorPayload, ServerFrame};
use crate::auth::verify_token;
use crate::state::AppState;

/// Heartbeats are sent this often.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A peer silent for longer than this is closed.
const LIVENESS_LIMIT: Duration = Duration::from_secs(120);
/// Deadline for writing a single frame; a peer that cannot accept a frame
/// within it is treated as gone.
const FRAME_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: String,
}

/// `GET /ws?token=<jwt>` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state, query.token))
}

async fn run_session(socket: WebSocket, state: AppState, token: String) {
    let claims = verify_token(&token, state.service_key.as_deref());
    let client_id = uuid::Uuid::new_v4().to_string();
    let user_id = claims.as_ref().map(|c| c.sub.clone());
    let authenticated = claims.is_some();

    let outbound = state
        .hub
        .register(&client_id, user_id.clone(), authenticated)
        .await;

    info!(client = %client_id, authenticated, "session connected");

    let (mut sink, mut stream) = socket.split();

    let connected = ServerFrame::Connected {
        id: uuid::Uuid::new_v4().to_string(),
        payload: ConnectedPayload {
            client_id: client_id.clone(),
            user_id,
            authenticated,
        },
    };
    if send_frame(&mut sink, &connected).await.is_err() {
        state.hub.unregister(&client_id).await;
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // Frames from the hub (responses are sent inline, so these are
            // events and lag notices).
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    // Hub dropped us (saturation close).
                    None => break,
                }
            }

            // Frames from the peer.
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                last_seen = Instant::now();

                let text = match message {
                    WsMessage::Text(text) => text,
                    WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                    WsMessage::Close(_) => break,
                    WsMessage::Binary(_) => continue,
                };

                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Heartbeat { .. }) => {}
                    Ok(ClientFrame::Request { id, request }) => {
                        let frame = match super::handlers::handle(&state, &client_id, request).await {
                            Ok(payload) => ServerFrame::Response { id, payload },
                            Err(e) => {
                                debug!(error = %e, "request failed");
                                state.hub.record_error();
                                ServerFrame::Error {
                                    id,
                                    payload: ErrorPayload {
                                        code: e.status().as_u16(),
                                        message: e.to_string(),
                                        details: None,
                                    },
                                }
                            }
                        };
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        state.hub.record_error();
                        let frame = ServerFrame::Error {
                            id: uuid::Uuid::new_v4().to_string(),
                            payload: ErrorPayload {
                                code: 400,
                                message: format!("unparseable frame: {e}"),
                                details: None,
                            },
                        };
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Outbound heartbeat plus liveness check.
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > LIVENESS_LIMIT {
                    warn!(client = %client_id, "peer silent; closing session");
                    break;
                }
                let frame = ServerFrame::Heartbeat {
                    id: uuid::Uuid::new_v4().to_string(),
                };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.unregister(&client_id).await;
    info!(client = %client_id, "session closed");
}

async fn send_frame(
    sink: &mut (impl SinkExt<WsMessage, Error = axum::Error> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    match tokio::time::timeout(FRAME_SEND_TIMEOUT, sink.send(WsMessage::Text(text))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(()),
        Err(_) => {
            warn!("frame send timed out");
            Err(())
        }
    }
}
