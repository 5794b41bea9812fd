//! Room Relay
//!
//! A real-time notification relay. Clients hold a WebSocket open, join and
//! leave named rooms, and receive a `refresh` event a fixed delay after any
//! join to a room they are in, telling them to re-fetch their data.
//!
//! # Modules
//!
//! - `registry`: live connections and their outbound queues
//! - `rooms`: many-to-many room membership table
//! - `scheduler`: cancellable deferred room broadcasts
//! - `relay`: the engine tying the three together and dispatching client events
//! - `api`: axum router and WebSocket transport
//! - `config`: environment-driven configuration
//! - `types`: identifiers, wire events, and errors
//! - `utils`: timestamp helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use room_relay::{serve, Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = RelayConfig::from_env();
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
//!     let relay = Arc::new(Relay::new(config));
//!     serve(listener, relay, async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod config;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod scheduler;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use api::{create_router, serve};
pub use config::RelayConfig;
pub use registry::{ConnectionHandle, ConnectionRegistry, OutboundReceiver};
pub use relay::{Relay, RelayStats, ShutdownReport};
pub use rooms::MembershipTable;
pub use scheduler::{
    BroadcastId, BroadcastPolicy, BroadcastScheduler, DeliveryReport, RefreshTarget,
    ScheduleOutcome,
};
pub use types::{ConnectionId, InboundEvent, OutboundEvent, RelayError, RelayResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
