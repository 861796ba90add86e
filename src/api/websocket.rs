//! WebSocket push of negotiation notifications.
//!
//! Connection lifecycle:
//! 1. Client opens `GET /ws/notifications?recipient_id=xxx`
//! 2. The hub subscription is taken before the upgrade completes, so every
//!    event committed after the handshake is delivered
//! 3. Events addressed to `recipient_id` are forwarded as JSON text frames
//! 4. Ping every 30s; 3 unanswered pings = disconnect

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::notification::NotificationEvent;

/// Ping interval.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Disconnect after this many unanswered pings (3 × 30s = 90s).
const MAX_MISSED_HEARTBEATS: u32 = 3;

#[derive(Deserialize)]
pub struct SubscribeQuery {
    recipient_id: String,
}

/// Tracks unanswered pings for one connection.
#[derive(Debug, Default)]
pub(crate) struct Liveness {
    missed: u32,
}

impl Liveness {
    fn on_pong(&mut self) {
        self.missed = 0;
    }

    /// Called on each heartbeat tick. Returns false when the peer is gone.
    fn on_tick(&mut self) -> bool {
        if self.missed >= MAX_MISSED_HEARTBEATS {
            return false;
        }
        self.missed += 1;
        true
    }
}

/// `GET /ws/notifications?recipient_id=`: upgrade to a push stream.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    query: Result<Query<SubscribeQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let recipient_id = query.recipient_id.trim().to_string();
    if recipient_id.is_empty() {
        return Err(ApiError::Validation("recipient_id is required".into()));
    }

    let rx = ctx.core.subscribe();
    tracing::info!(recipient_id = %recipient_id, "Notification subscriber connected");
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, rx, recipient_id)))
}

async fn handle_ws(
    socket: WebSocket,
    mut rx: broadcast::Receiver<NotificationEvent>,
    recipient_id: String,
) {
    let (mut sink, mut stream) = socket.split();
    let mut liveness = Liveness::default();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) if event.recipient_id == recipient_id => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(_) => continue,
                        };
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            recipient_id = %recipient_id,
                            skipped,
                            "Notification subscriber lagged; events dropped"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => liveness.on_pong(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Client frames carry no commands
                }
            }
            _ = heartbeat.tick() => {
                if !liveness.on_tick() {
                    tracing::info!(
                        recipient_id = %recipient_id,
                        "{MAX_MISSED_HEARTBEATS} missed heartbeats, disconnecting"
                    );
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    tracing::info!(recipient_id = %recipient_id, "Notification subscriber disconnected");
}
