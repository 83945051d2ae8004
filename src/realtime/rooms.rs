//! Room registry
//!
//! Tracks which live connections belong to which rooms: one room per
//! conversation id plus the shared admin room. Purely in-memory; nothing here
//! survives a restart. Rooms are created on first join and removed when empty.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;

use super::connection::{ConnectionHandle, ConnectionId};

pub const ADMIN_ROOM: &str = "admin_room";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Conversation(String),
    Admin,
}

impl Room {
    pub fn conversation(id: impl Into<String>) -> Self {
        Room::Conversation(id.into())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Conversation(id) => f.write_str(id),
            Room::Admin => f.write_str(ADMIN_ROOM),
        }
    }
}

#[derive(Default)]
struct Membership {
    rooms: HashMap<Room, HashMap<ConnectionId, ConnectionHandle>>,
    // Reverse index so leave_all does not scan every room.
    by_connection: HashMap<ConnectionId, HashSet<Room>>,
}

impl Membership {
    fn remove(&mut self, id: ConnectionId, room: &Room) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id).is_some();
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }
}

/// Membership table shared by the socket handlers and the broadcast
/// dispatcher. Locks are held only for map operations, never across awaits.
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Membership>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub fn join(&self, conn: &ConnectionHandle, room: Room) {
        let mut inner = self.inner.write();
        inner
            .by_connection
            .entry(conn.id())
            .or_default()
            .insert(room.clone());
        let members = inner.rooms.entry(room.clone()).or_default();
        members.insert(conn.id(), conn.clone());

        tracing::debug!(
            room = %room,
            connection_id = %conn.id(),
            room_size = members.len(),
            "Connection joined room"
        );
    }

    /// Remove a connection from one room. Unknown rooms are ignored.
    pub fn leave(&self, id: ConnectionId, room: &Room) {
        let mut inner = self.inner.write();
        if inner.remove(id, room) {
            if let Some(rooms) = inner.by_connection.get_mut(&id) {
                rooms.remove(room);
                if rooms.is_empty() {
                    inner.by_connection.remove(&id);
                }
            }
            tracing::debug!(room = %room, connection_id = %id, "Connection left room");
        }
    }

    /// Remove a connection from every room it joined
    pub fn leave_all(&self, id: ConnectionId) {
        let mut inner = self.inner.write();
        let Some(rooms) = inner.by_connection.remove(&id) else {
            return;
        };
        for room in &rooms {
            inner.remove(id, room);
        }
        tracing::debug!(
            connection_id = %id,
            room_count = rooms.len(),
            "Removed connection from rooms"
        );
    }

    /// Snapshot of the connections currently in a room
    pub fn members_of(&self, room: &Room) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .rooms
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> HashSet<Room> {
        self.inner
            .read()
            .by_connection
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn room_size(&self, room: &Room) -> usize {
        self.inner.read().rooms.get(room).map_or(0, HashMap::len)
    }

    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }
}
