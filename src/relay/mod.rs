//! Relay - connection, room, and broadcast engine
//!
//! The [`Relay`] owns the shared connection/membership tables and the
//! deferred broadcast scheduler, and is the single entry point the transport
//! layer talks to. One instance is constructed at startup and shared by
//! reference (`Arc<Relay>`) with every connection handler.
//!
//! # Locking
//!
//! The registry and the membership table live behind one `RwLock`.
//! Registration, disconnect (unregister + purge), join and leave take the
//! write lock; a firing broadcast resolves `members_of(room)` and sends to
//! each member under the read lock. A disconnected connection can therefore
//! never receive a broadcast that observed it as removed.

mod dispatch;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::registry::{outbound_queue, ConnectionHandle, ConnectionRegistry, OutboundReceiver};
use crate::rooms::MembershipTable;
use crate::scheduler::{BroadcastScheduler, DeliveryReport, RefreshTarget, ScheduleOutcome};
use crate::types::{validate_room_label, ConnectionId, OutboundEvent, RelayError, RelayResult};
use crate::utils::current_timestamp;

/// Connection registry and membership table, mutated together
struct RelayTables {
    registry: ConnectionRegistry,
    rooms: MembershipTable,
}

/// Shared state read by timer firings and mutated by connection handlers
struct RelayState {
    tables: RwLock<RelayTables>,
    closed: AtomicBool,
}

impl RelayState {
    fn new(max_connections: usize) -> Self {
        Self {
            tables: RwLock::new(RelayTables {
                registry: ConnectionRegistry::new(max_connections),
                rooms: MembershipTable::new(),
            }),
            closed: AtomicBool::new(false),
        }
    }
}

impl RefreshTarget for RelayState {
    fn refresh_room(&self, room: &str) -> DeliveryReport {
        let tables = self.tables.read();
        let mut report = DeliveryReport::default();

        for id in tables.rooms.members_of(room) {
            if tables.registry.send(id, OutboundEvent::Refresh) {
                report.delivered += 1;
            } else {
                // Closed transport; its handler will unregister it
                warn!(room, connection = %id, "Refresh not accepted by transport");
                report.failed += 1;
            }
        }
        report
    }
}

/// Point-in-time counters for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub connections: usize,
    pub rooms: usize,
    pub pending_broadcasts: usize,
}

/// What `shutdown` tore down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cancelled_broadcasts: usize,
    pub closed_connections: usize,
}

/// The relay engine
pub struct Relay {
    state: Arc<RelayState>,
    scheduler: BroadcastScheduler,
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        let state = Arc::new(RelayState::new(config.max_connections));
        let scheduler = BroadcastScheduler::with_config(
            state.clone(),
            config.broadcast_policy,
            config.max_pending_broadcasts,
        );

        Self {
            state,
            scheduler,
            config,
        }
    }

    /// Register a new connection.
    ///
    /// Returns its handle and the receiving end of its outbound queue, which
    /// already holds the `connected` greeting.
    pub fn open_connection(&self) -> RelayResult<(ConnectionHandle, OutboundReceiver)> {
        let (tx, rx) = outbound_queue(self.config.outbound_queue_capacity);

        let handle = {
            let mut tables = self.state.tables.write();
            if self.state.closed.load(Ordering::SeqCst) {
                return Err(RelayError::ShuttingDown);
            }
            tables.registry.register(tx)?
        };

        handle.send(OutboundEvent::Connected {
            connection_id: handle.id(),
        });
        info!(connection = %handle.id(), "Client connected");
        Ok((handle, rx))
    }

    /// Unregister a connection and purge it from every room.
    ///
    /// Idempotent; returns `false` if the connection was already gone.
    pub fn close_connection(&self, id: ConnectionId) -> bool {
        let (removed, rooms) = {
            let mut tables = self.state.tables.write();
            let removed = tables.registry.unregister(id);
            let rooms = tables.rooms.purge(id);
            (removed, rooms)
        };

        match removed {
            Some(handle) => {
                let connected_secs = current_timestamp().saturating_sub(handle.connected_at());
                info!(connection = %id, rooms = rooms.len(), connected_secs, "Client disconnected");
                true
            }
            None => false,
        }
    }

    /// Add a connection to a room and schedule a deferred refresh for it.
    ///
    /// A broadcast is scheduled on every call, even when the connection was
    /// already a member. Returns `Ok(None)` for unknown connections. If the
    /// broadcast cannot be scheduled, a membership added by this call is
    /// rolled back before the error is returned.
    pub fn join(&self, id: ConnectionId, room: &str) -> RelayResult<Option<ScheduleOutcome>> {
        validate_room_label(room, self.config.max_room_label_len)?;

        let added = {
            let mut tables = self.state.tables.write();
            if !tables.registry.contains(id) {
                debug!(connection = %id, room, "Join from unregistered connection ignored");
                return Ok(None);
            }
            tables.rooms.join(id, room)
        };

        match self.scheduler.schedule(room, self.config.broadcast_delay) {
            Ok(outcome) => {
                debug!(connection = %id, room, "Joined room");
                Ok(Some(outcome))
            }
            Err(e) => {
                if added {
                    self.state.tables.write().rooms.leave(id, room);
                }
                Err(e)
            }
        }
    }

    /// Remove a connection from a room. Pending broadcasts are not cancelled.
    pub fn leave(&self, id: ConnectionId, room: &str) -> RelayResult<bool> {
        validate_room_label(room, self.config.max_room_label_len)?;

        let left = self.state.tables.write().rooms.leave(id, room);
        if left {
            debug!(connection = %id, room, "Left room");
        }
        Ok(left)
    }

    /// Handles of the current members of `room`
    pub fn members_of(&self, room: &str) -> Vec<ConnectionHandle> {
        let tables = self.state.tables.read();
        tables
            .rooms
            .members_of(room)
            .into_iter()
            .filter_map(|id| tables.registry.get(id).cloned())
            .collect()
    }

    /// Rooms a connection currently belongs to
    pub fn rooms_of(&self, id: ConnectionId) -> HashSet<String> {
        self.state.tables.read().rooms.rooms_of(id)
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.state.tables.read().registry.contains(id)
    }

    /// Best-effort send to one connection
    pub fn send(&self, id: ConnectionId, event: OutboundEvent) -> bool {
        self.state.tables.read().registry.send(id, event)
    }

    /// Send `refresh` to the current members of `room` right away
    pub fn refresh_room(&self, room: &str) -> DeliveryReport {
        self.state.refresh_room(room)
    }

    pub fn scheduler(&self) -> &BroadcastScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> RelayStats {
        let (connections, rooms) = {
            let tables = self.state.tables.read();
            (tables.registry.len(), tables.rooms.room_count())
        };
        RelayStats {
            connections,
            rooms,
            pending_broadcasts: self.scheduler.pending_count(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Cancel every pending broadcast, then close and drop every connection.
    ///
    /// New connections are refused afterwards. Safe to call more than once.
    pub fn shutdown(&self) -> ShutdownReport {
        let cancelled_broadcasts = self.scheduler.cancel_all();

        let drained = {
            let mut tables = self.state.tables.write();
            self.state.closed.store(true, Ordering::SeqCst);
            tables.rooms.clear();
            tables.registry.drain()
        };
        let closed_connections = drained.len();
        drop(drained);

        info!(cancelled_broadcasts, closed_connections, "Relay shut down");
        ShutdownReport {
            cancelled_broadcasts,
            closed_connections,
        }
    }
}
