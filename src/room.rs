use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Server-authoritative room membership, keyed by booking id.
///
/// Rooms are a runtime projection only: created on first join, dropped
/// when the last member leaves. Join and leave are idempotent, so
/// repeated or out-of-order membership mutations converge on the same
/// final state without client-side locking.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    // room_id -> conn_id -> user_id
    rooms: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session to a room. Returns true only on a fresh join.
    pub async fn join(&self, room_id: &str, conn_id: &str, user_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room_id.to_string()).or_default();
        members
            .insert(conn_id.to_string(), user_id.to_string())
            .is_none()
    }

    /// Removes a session from a room, returning the user id it was
    /// joined as. Empty rooms are dropped.
    pub async fn leave(&self, room_id: &str, conn_id: &str) -> Option<String> {
        let mut rooms = self.rooms.write().await;
        let members = rooms.get_mut(room_id)?;
        let user_id = members.remove(conn_id);
        if members.is_empty() {
            rooms.remove(room_id);
        }
        user_id
    }

    /// Removes a session from every room it had joined. Disconnect
    /// implies leave. Returns the (room, user) pairs that were left.
    pub async fn leave_all(&self, conn_id: &str) -> Vec<(String, String)> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|room_id, members| {
            if let Some(user_id) = members.remove(conn_id) {
                left.push((room_id.clone(), user_id));
            }
            !members.is_empty()
        });
        left
    }

    /// Current (conn, user) members of a room.
    pub async fn members(&self, room_id: &str) -> Vec<(String, String)> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(conn, user)| (conn.clone(), user.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any session of the given user is joined to the room.
    pub async fn user_present(&self, room_id: &str, user_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .is_some_and(|members| members.values().any(|u| u == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_is_idempotent() {
        let rooms = RoomRegistry::new();
        assert!(rooms.join("b1", "c1", "u1").await);
        assert!(!rooms.join("b1", "c1", "u1").await);
        assert_eq!(rooms.members("b1").await.len(), 1);
    }

    #[tokio::test]
    async fn empty_rooms_are_dropped() {
        let rooms = RoomRegistry::new();
        rooms.join("b1", "c1", "u1").await;
        assert_eq!(rooms.leave("b1", "c1").await.as_deref(), Some("u1"));
        assert!(rooms.members("b1").await.is_empty());
        // leaving again is a no-op
        assert!(rooms.leave("b1", "c1").await.is_none());
    }

    #[tokio::test]
    async fn leave_all_spans_rooms() {
        let rooms = RoomRegistry::new();
        rooms.join("b1", "c1", "u1").await;
        rooms.join("b2", "c1", "u1").await;
        rooms.join("b2", "c2", "u2").await;

        let mut left = rooms.leave_all("c1").await;
        left.sort();
        assert_eq!(
            left,
            vec![
                ("b1".to_string(), "u1".to_string()),
                ("b2".to_string(), "u1".to_string())
            ]
        );
        assert!(!rooms.user_present("b2", "u1").await);
        assert!(rooms.user_present("b2", "u2").await);
    }
}
