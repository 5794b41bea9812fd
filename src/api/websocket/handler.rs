//! WebSocket connection handler
//!
//! Adapts one WebSocket to the relay: registers it on open, feeds inbound
//! text frames to [`Relay::dispatch`] in arrival order, writes the
//! connection's outbound queue to the socket, and unregisters on close.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::{debug, warn};

use super::state::AppState;
use crate::relay::Relay;
use crate::types::{ConnectionId, InboundEvent, OutboundEvent};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, relay: Arc<Relay>) {
    let (handle, mut outbound) = match relay.open_connection() {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "Refusing WebSocket connection");
            let _ = send_event(&mut socket, &OutboundEvent::error(e.code(), e.to_string())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let id = handle.id();
    // Only the registry may keep the queue open, so shutdown can close it
    drop(handle);

    loop {
        tokio::select! {
            // Outbound events for this client
            event = outbound.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    None => {
                        // Dropped from the registry (shutdown)
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // Handle client messages
            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(&relay, id, msg, &mut socket).await {
                            break; // Client requested close
                        }
                    }
                    Some(Err(e)) => {
                        debug!(connection = %id, error = %e, "WebSocket error");
                        break;
                    }
                    None => break, // Client disconnected
                }
            }
        }
    }

    relay.close_connection(id);
}

/// Handle a message from the client
/// Returns false if the connection should be closed
async fn handle_client_message(
    relay: &Relay,
    id: ConnectionId,
    msg: Message,
    socket: &mut WebSocket,
) -> bool {
    match msg {
        Message::Text(text) => {
            match serde_json::from_str::<InboundEvent>(&text) {
                // Rejections are already logged and answered by dispatch
                Ok(event) => {
                    let _ = relay.dispatch(id, event);
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "Unparseable client message");
                    relay.send(id, OutboundEvent::error("bad_message", e.to_string()));
                }
            }
            true
        }
        Message::Binary(_) => true, // Ignore binary messages
        Message::Ping(data) => {
            let _ = socket.send(Message::Pong(data)).await;
            true
        }
        Message::Pong(_) => true, // Ignore pong responses
        Message::Close(_) => false, // Client requested close
    }
}

async fn send_event(socket: &mut WebSocket, event: &OutboundEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to serialize event");
            Ok(())
        }
    }
}
