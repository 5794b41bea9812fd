//! API module for the HTTP and WebSocket endpoints
//!
//! The transport layer around the relay: the `/ws` socket endpoint plus
//! health and stats routes.

pub mod http;
pub mod websocket;

pub use http::{create_router, serve};
