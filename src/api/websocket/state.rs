//! WebSocket application state

use std::sync::Arc;

use crate::relay::Relay;

/// Shared application state for WebSocket connections
#[derive(Clone)]
pub struct AppState {
    /// The relay engine shared by every connection handler
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }
}
