//! WebSocket transport for the relay
//!
//! Provides the WebSocket endpoint at `/ws`. Each socket is one relay
//! connection; JSON text frames carry `join`, `leave` and `ping` in and
//! `connected`, `refresh`, `pong` and `error` out.

pub mod handler;
pub mod state;

pub use handler::ws_handler;
pub use state::AppState;
