//! Relay configuration from environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::scheduler::{BroadcastPolicy, DEFAULT_BROADCAST_DELAY, DEFAULT_MAX_PENDING_BROADCASTS};
use crate::registry::DEFAULT_OUTBOUND_QUEUE_CAPACITY;
use crate::types::DEFAULT_MAX_ROOM_LABEL_LEN;
use crate::utils::duration_ms;

/// Default listen port
pub const DEFAULT_PORT: u16 = 4000;

/// Default registry capacity
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Runtime configuration of the relay and its transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Fixed delay between a join and its refresh broadcast
    pub broadcast_delay: Duration,
    pub broadcast_policy: BroadcastPolicy,
    pub max_connections: usize,
    pub max_pending_broadcasts: usize,
    pub max_room_label_len: usize,
    /// Per-connection outbound queue size; sends to a full queue are dropped
    pub outbound_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            broadcast_delay: DEFAULT_BROADCAST_DELAY,
            broadcast_policy: BroadcastPolicy::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_pending_broadcasts: DEFAULT_MAX_PENDING_BROADCASTS,
            max_room_label_len: DEFAULT_MAX_ROOM_LABEL_LEN,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `RELAY_HOST`: bind address (default: `0.0.0.0`)
    /// - `RELAY_PORT`, falling back to `PORT`: listen port (default: 4000)
    /// - `RELAY_BROADCAST_DELAY_MS`: join-to-refresh delay (default: 5000)
    /// - `RELAY_BROADCAST_POLICY`: `per_join` | `coalesce` (default: `per_join`)
    /// - `RELAY_MAX_CONNECTIONS`: registry capacity (default: 10000)
    /// - `RELAY_MAX_PENDING_BROADCASTS`: scheduler capacity (default: 100000)
    /// - `RELAY_MAX_ROOM_LABEL_LEN`: room label limit in bytes (default: 256)
    /// - `RELAY_OUTBOUND_QUEUE_CAPACITY`: queued events per connection (default: 64)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port_value = lookup("RELAY_PORT").or_else(|| lookup("PORT"));
        let delay_ms = parse_or(
            "RELAY_BROADCAST_DELAY_MS",
            lookup("RELAY_BROADCAST_DELAY_MS"),
            duration_ms(defaults.broadcast_delay),
        );

        Self {
            host: parse_or("RELAY_HOST", lookup("RELAY_HOST"), defaults.host),
            port: parse_or("RELAY_PORT", port_value, defaults.port),
            broadcast_delay: Duration::from_millis(delay_ms),
            broadcast_policy: parse_or(
                "RELAY_BROADCAST_POLICY",
                lookup("RELAY_BROADCAST_POLICY"),
                defaults.broadcast_policy,
            ),
            max_connections: parse_or(
                "RELAY_MAX_CONNECTIONS",
                lookup("RELAY_MAX_CONNECTIONS"),
                defaults.max_connections,
            ),
            max_pending_broadcasts: parse_or(
                "RELAY_MAX_PENDING_BROADCASTS",
                lookup("RELAY_MAX_PENDING_BROADCASTS"),
                defaults.max_pending_broadcasts,
            ),
            max_room_label_len: parse_or(
                "RELAY_MAX_ROOM_LABEL_LEN",
                lookup("RELAY_MAX_ROOM_LABEL_LEN"),
                defaults.max_room_label_len,
            ),
            outbound_queue_capacity: parse_or(
                "RELAY_OUTBOUND_QUEUE_CAPACITY",
                lookup("RELAY_OUTBOUND_QUEUE_CAPACITY"),
                defaults.outbound_queue_capacity,
            ),
        }
    }

    /// Socket address to listen on
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn with_broadcast_delay(mut self, delay: Duration) -> Self {
        self.broadcast_delay = delay;
        self
    }

    pub fn with_max_pending_broadcasts(mut self, limit: usize) -> Self {
        self.max_pending_broadcasts = limit;
        self
    }

    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    pub fn with_broadcast_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.broadcast_policy = policy;
        self
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => match raw.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparseable setting, using default");
                default
            }
        },
        None => default,
    }
}
