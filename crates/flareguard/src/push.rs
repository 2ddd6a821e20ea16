//! Push Endpoint: accepts push connections, authenticates, relays client control messages.

use crate::broadcast::BroadcastEngine;
use crate::error::PushError;
use crate::proto::{ClientMessage, ServerFrame, ServerMessage, Thresholds};
use crate::registry::ConnectionRegistry;
use crate::ports::TokenValidator;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PushState {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcast: Arc<BroadcastEngine>,
    pub token_validator: Arc<dyn TokenValidator>,
}

pub fn router(state: Arc<PushState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<PushState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.token))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
    authenticated_connections: usize,
}

async fn healthz(State(state): State<Arc<PushState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        connections: state.registry.count(),
        authenticated_connections: state.registry.count_authenticated(),
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<PushState>, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ServerFrame>(32);

    let connection_id = state.registry.add(tx);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut authenticated = false;
    let mut tier = crate::proto::Tier::Free;
    let mut user_id = None;

    if let Some(token) = token {
        if let Some((uid, t)) = state.token_validator.validate(&token).await {
            if state.registry.authenticate(connection_id, uid, t).is_ok() {
                authenticated = true;
                tier = t;
                user_id = Some(uid);
            }
        }
    }

    let connection_frame = ServerMessage::Connection {
        connection_id,
        authenticated,
        tier,
        message: if authenticated {
            "connected and authenticated".to_string()
        } else {
            "connected".to_string()
        },
    }
    .into_frame();

    if send_frame(&state, connection_id, connection_frame).await.is_err() {
        state.registry.remove(connection_id);
        let _ = writer.await;
        return;
    }

    if authenticated {
        if let Some(uid) = user_id {
            state.broadcast.flush_user_queue(uid).await;
        }
    }

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(_) => break,
        };

        match message {
            Message::Text(text) => {
                handle_client_message(&state, connection_id, &text).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.remove(connection_id);
    writer.abort();
    debug!(connection_id = %connection_id, "connection closed");
}

async fn handle_client_message(state: &Arc<PushState>, connection_id: uuid::Uuid, text: &str) {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);

    let Ok(client_message) = parsed else {
        warn!(connection_id = %connection_id, "received malformed client message");
        return;
    };

    match client_message {
        ClientMessage::Heartbeat => {
            state.registry.record_heartbeat(connection_id);
            let frame = ServerMessage::HeartbeatAck {
                message: "ack".to_string(),
            }
            .into_frame();
            let _ = send_frame(state, connection_id, frame).await;
        }
        ClientMessage::Authenticate { token } => {
            let reply = match state.token_validator.validate(&token).await {
                Some((user_id, tier)) if state.registry.authenticate(connection_id, user_id, tier).is_ok() => {
                    state.broadcast.flush_user_queue(user_id).await;
                    ServerMessage::AuthSuccess {
                        user_id: Some(user_id),
                        tier: Some(tier),
                        message: "authenticated".to_string(),
                    }
                }
                _ => ServerMessage::AuthError {
                    user_id: None,
                    tier: None,
                    message: "invalid token".to_string(),
                },
            };
            let _ = send_frame(state, connection_id, reply.into_frame()).await;
        }
        ClientMessage::UpdateThresholds { thresholds } => {
            let reply = apply_threshold_update(state, connection_id, thresholds);
            let _ = send_frame(state, connection_id, reply.into_frame()).await;
        }
    }
}

fn apply_threshold_update(state: &Arc<PushState>, connection_id: uuid::Uuid, thresholds: Thresholds) -> ServerMessage {
    match state.registry.update_thresholds(connection_id, thresholds) {
        Ok(()) => ServerMessage::ThresholdsUpdated {
            thresholds: Some(thresholds),
            message: "thresholds updated".to_string(),
        },
        Err(_) => ServerMessage::Error {
            thresholds: None,
            message: "thresholds must be non-decreasing and within [0,1]".to_string(),
        },
    }
}

async fn send_frame(state: &Arc<PushState>, connection_id: uuid::Uuid, frame: ServerFrame) -> Result<(), PushError> {
    let Some(conn) = state.registry.get(connection_id) else {
        return Err(PushError::Closed);
    };
    conn.tx.send(frame).await.map_err(|_| PushError::SendFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryTracker;
    use crate::ports::inmemory::{InMemoryPredictionsRepository, InMemorySubscriptions, StaticTokenValidator};
    use crate::queue::OfflineQueue;
    use crate::webhook::WebhookDispatcher;
    use std::time::Duration;

    fn push_state() -> Arc<PushState> {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcast = Arc::new(BroadcastEngine::new(
            registry.clone(),
            Arc::new(OfflineQueue::new(100)),
            Arc::new(DeliveryTracker::new()),
            Arc::new(WebhookDispatcher::new(Duration::from_secs(10), 32)),
            Arc::new(InMemorySubscriptions::new()),
            Arc::new(InMemoryPredictionsRepository::new()),
            Thresholds::default(),
            chrono::Duration::hours(1),
        ));
        Arc::new(PushState {
            registry,
            broadcast,
            token_validator: Arc::new(StaticTokenValidator::new()),
        })
    }

    #[tokio::test]
    async fn test_threshold_update_rejects_non_monotonic() {
        let state = push_state();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let id = state.registry.add(tx);

        let reply = apply_threshold_update(
            &state,
            id,
            Thresholds {
                low: 0.9,
                medium: 0.5,
                high: 0.4,
            },
        );
        assert!(matches!(reply, ServerMessage::Error { .. }));
    }

    #[tokio::test]
    async fn test_threshold_update_accepts_valid() {
        let state = push_state();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let id = state.registry.add(tx);

        let reply = apply_threshold_update(
            &state,
            id,
            Thresholds {
                low: 0.1,
                medium: 0.4,
                high: 0.7,
            },
        );
        assert!(matches!(reply, ServerMessage::ThresholdsUpdated { .. }));
    }

    #[tokio::test]
    async fn test_handle_malformed_json_is_ignored() {
        let state = push_state();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let id = state.registry.add(tx);

        handle_client_message(&state, id, "not json").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_replies_with_ack() {
        let state = push_state();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let id = state.registry.add(tx);

        handle_client_message(&state, id, r#"{"type":"heartbeat"}"#).await;
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame.message, ServerMessage::HeartbeatAck { .. }));
    }
}
