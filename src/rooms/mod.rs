//! Room Membership Table
//!
//! Many-to-many mapping between connections and room labels. Rooms exist
//! implicitly: a room is created by its first join and removed as soon as its
//! member set becomes empty.
//!
//! Both directions are indexed so that `members_of` and `purge` are cheap:
//! - `rooms`: room label -> member connection ids
//! - `memberships`: connection id -> room labels it belongs to

use std::collections::{HashMap, HashSet};

use crate::types::ConnectionId;

/// Bidirectional room membership index
#[derive(Debug, Default)]
pub struct MembershipTable {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to `room`. Returns `false` if it was already a member.
    pub fn join(&mut self, id: ConnectionId, room: &str) -> bool {
        let added = self.rooms.entry(room.to_string()).or_default().insert(id);
        if added {
            self.memberships
                .entry(id)
                .or_default()
                .insert(room.to_string());
        }
        added
    }

    /// Remove `id` from `room`. Returns `false` if it was not a member.
    pub fn leave(&mut self, id: ConnectionId, room: &str) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
                removed
            }
            None => false,
        };

        if removed {
            if let Some(rooms) = self.memberships.get_mut(&id) {
                rooms.remove(room);
                if rooms.is_empty() {
                    self.memberships.remove(&id);
                }
            }
        }
        removed
    }

    /// Snapshot of the current members of `room`. Empty for unknown rooms.
    pub fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Remove `id` from every room. Returns the rooms it was removed from.
    pub fn purge(&mut self, id: ConnectionId) -> Vec<String> {
        let Some(rooms) = self.memberships.remove(&id) else {
            return Vec::new();
        };

        for room in &rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        rooms.into_iter().collect()
    }

    /// Rooms `id` currently belongs to
    pub fn rooms_of(&self, id: ConnectionId) -> HashSet<String> {
        self.memberships.get(&id).cloned().unwrap_or_default()
    }

    pub fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Number of non-empty rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop every membership
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.memberships.clear();
    }
}
