//! Realtime gateway.
//!
//! The handshake credential travels in the `authentication` header of the upgrade
//! request (`?token=` is accepted for clients that cannot set headers). Admission
//! runs before the upgrade, so a refused handshake is a plain HTTP 401/403.
//!
//! Frames are JSON text: `{"event": "...", "payload": ...}`.

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AppState, OP_REALTIME_CONNECT};
use crate::error::AppError;
use crate::identity::{bearer_token, Identity, Outbound, OutboundEvent};

pub const EVENT_MESSAGE_FROM_CLIENT: &str = "message-from-client";
pub const EVENT_MESSAGE_FROM_SERVER: &str = "message-from-server";
const EMPTY_MESSAGE: &str = "no-message";

#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn handshake_token<'a>(headers: &'a HeaderMap, params: &'a HashMap<String, String>) -> Option<&'a str> {
    headers
        .get("authentication")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .or_else(|| params.get("token").map(String::as_str).and_then(bearer_token))
}

pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let ctx = match state.gate.admit_operation(OP_REALTIME_CONNECT, handshake_token(&headers, &params)).await {
        Ok(ctx) => ctx,
        Err(err) => {
            debug!(target: "ws", "handshake refused: {err}");
            return AppError::from(err).into_response();
        }
    };
    let Some(identity) = ctx.identity else {
        return AppError::internal("internal", "identity missing after admission").into_response();
    };
    ws.on_upgrade(move |socket| run_connection(state, identity, socket))
}

async fn run_connection(state: AppState, identity: Identity, socket: WebSocket) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let (mut sink, mut stream) = socket.split();

    let registration = match state.registry.register(&connection_id, identity, tx) {
        Ok(r) => r,
        Err(err) => {
            let app = AppError::from(err);
            let frame = CloseFrame { code: app.ws_close_code(), reason: app.message().to_string().into() };
            let _ = sink.send(Message::Close(Some(frame))).await;
            return;
        }
    };
    info!(
        target: "ws",
        "connected {} user={} evicted={:?}",
        connection_id, registration.connection.identity.id, registration.evicted
    );

    let mut writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Event(ev) => {
                    let text = match serde_json::to_string(&ev) {
                        Ok(t) => t,
                        Err(e) => { warn!(target: "ws", "dropping unserializable event {}: {e}", ev.event); continue; }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() { break; }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_inbound(&state, &connection_id, text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    // No-op when the connection was already evicted
    state.registry.remove(&connection_id);
    writer.abort();
    info!(target: "ws", "disconnected {}", connection_id);
}

fn handle_inbound(state: &AppState, connection_id: &str, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(target: "ws", "ignoring malformed frame from {}: {e}", connection_id);
            return;
        }
    };
    match frame.event.as_str() {
        EVENT_MESSAGE_FROM_CLIENT => {
            let message = frame
                .payload
                .get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(EMPTY_MESSAGE);
            let relay = OutboundEvent::new(
                EVENT_MESSAGE_FROM_SERVER,
                serde_json::json!({
                    "fullName": state.registry.display_name_for(connection_id),
                    "message": message,
                }),
            );
            let delivered = state.registry.broadcast_except(connection_id, relay);
            crate::tprintln!("ws.relay from={} delivered={}", connection_id, delivered);
        }
        other => debug!(target: "ws", "ignoring unknown event '{}' from {}", other, connection_id),
    }
}
