use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use uuid::Uuid;

/// Private room membership: room_id -> joined connections.
#[derive(Default)]
pub struct RoomTable {
    inner: RwLock<Rooms>,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<String, HashSet<Uuid>>,
    /// Reverse index so disconnect doesn't scan every room.
    joined: HashMap<Uuid, HashSet<String>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the connection to the room, creating it if needed.
    /// Returns false if it was already a member.
    pub async fn join(&self, room_id: &str, conn_id: Uuid) -> bool {
        let mut rooms = self.inner.write().await;
        let added = rooms
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
        rooms
            .joined
            .entry(conn_id)
            .or_default()
            .insert(room_id.to_string());
        added
    }

    /// Remove one membership. Returns false if the connection wasn't in the room.
    pub async fn leave(&self, room_id: &str, conn_id: Uuid) -> bool {
        let mut rooms = self.inner.write().await;
        let removed = remove_member(&mut rooms.members, room_id, conn_id);
        if let Some(joined) = rooms.joined.get_mut(&conn_id) {
            joined.remove(room_id);
            if joined.is_empty() {
                rooms.joined.remove(&conn_id);
            }
        }
        removed
    }

    /// Drop the connection from every room it joined. Returns those rooms.
    pub async fn leave_all(&self, conn_id: Uuid) -> Vec<String> {
        let mut rooms = self.inner.write().await;
        let Some(joined) = rooms.joined.remove(&conn_id) else {
            return Vec::new();
        };
        for room_id in &joined {
            remove_member(&mut rooms.members, room_id, conn_id);
        }
        joined.into_iter().collect()
    }

    /// Current members; empty for rooms nobody has joined.
    pub async fn members_of(&self, room_id: &str) -> HashSet<Uuid> {
        self.inner
            .read()
            .await
            .members
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) async fn room_count(&self) -> usize {
        self.inner.read().await.members.len()
    }
}

/// Empty rooms are dropped so the table only holds rooms with members.
fn remove_member(members: &mut HashMap<String, HashSet<Uuid>>, room_id: &str, conn_id: Uuid) -> bool {
    let Some(set) = members.get_mut(room_id) else {
        return false;
    };
    let removed = set.remove(&conn_id);
    if set.is_empty() {
        members.remove(room_id);
    }
    removed
}
