//! Inbound and outbound relay events
//!
//! Both directions travel as JSON text frames tagged by `type`.

use serde::{Deserialize, Serialize};

use super::connection::ConnectionId;

/// Events a client sends to the relay
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Join a room and schedule a deferred refresh for it
    Join { room: String },

    /// Leave a room
    Leave { room: String },

    /// Heartbeat
    Ping,
}

/// Events the relay sends to a client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Room activity happened; the client should re-fetch
    Refresh,

    /// Sent once when the connection is registered
    Connected { connection_id: ConnectionId },

    /// Heartbeat reply
    Pong,

    /// An inbound event was rejected
    Error { code: String, message: String },
}

impl OutboundEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Refresh => "refresh",
            OutboundEvent::Connected { .. } => "connected",
            OutboundEvent::Pong => "pong",
            OutboundEvent::Error { .. } => "error",
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
