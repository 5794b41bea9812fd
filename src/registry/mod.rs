//! Connection Registry
//!
//! Owns every live connection and its outbound queue. The registry is a plain
//! data structure; the [`Relay`](crate::relay::Relay) wraps it together with
//! the membership table behind a single lock.

use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::types::{ConnectionId, OutboundEvent, RelayError, RelayResult};
use crate::utils::current_timestamp;

/// Default number of events a connection may have queued
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Sending half of a connection's outbound queue
pub type OutboundSender = mpsc::Sender<OutboundEvent>;

/// Receiving half of a connection's outbound queue, drained by the transport
pub type OutboundReceiver = mpsc::Receiver<OutboundEvent>;

/// Create a bounded outbound queue. A capacity of zero is raised to one.
pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Handle for sending outbound events to one connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: OutboundSender,
    connected_at: u64,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Unix timestamp (seconds) at registration
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    /// Best-effort send. Returns whether the transport queue accepted it.
    ///
    /// Never waits: a full queue (the client is not reading) or a closed one
    /// drops the event and returns `false`.
    pub fn send(&self, event: OutboundEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    /// Whether the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Registry of live connections
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    next_id: u64,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a registry that accepts at most `max_connections` live connections
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            max_connections,
        }
    }

    /// Register a new connection around the given outbound queue
    pub fn register(&mut self, tx: OutboundSender) -> RelayResult<ConnectionHandle> {
        if self.connections.len() >= self.max_connections {
            return Err(RelayError::CapacityExhausted {
                limit: self.max_connections,
            });
        }

        let id = ConnectionId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(RelayError::IdSpaceExhausted)?;

        let handle = ConnectionHandle {
            id,
            tx,
            connected_at: current_timestamp(),
        };
        self.connections.insert(id, handle.clone());
        Ok(handle)
    }

    /// Remove a connection. Returns the handle if it was still registered.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Best-effort send to a registered connection.
    ///
    /// Returns `false` for unknown ids and for closed transports.
    pub fn send(&self, id: ConnectionId, event: OutboundEvent) -> bool {
        match self.connections.get(&id) {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    /// Remove every connection, dropping their outbound queues
    pub fn drain(&mut self) -> Vec<ConnectionHandle> {
        self.connections.drain().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
