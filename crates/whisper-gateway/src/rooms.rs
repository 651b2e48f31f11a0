use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use whisper_types::events::GatewayEvent;

pub type SessionSender = mpsc::UnboundedSender<GatewayEvent>;

/// In-memory map from chat id to the sessions currently bound to it.
/// Process-lifetime only: nothing here survives a restart, and a
/// disconnected session gets no redelivery. A session may be bound to any
/// number of rooms.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, SessionSender>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent add — re-binding an already-bound session replaces its
    /// sender and nothing else.
    pub async fn bind(&self, room_id: Uuid, session_id: Uuid, tx: SessionSender) {
        self.inner
            .write()
            .await
            .entry(room_id)
            .or_default()
            .insert(session_id, tx);
    }

    /// Idempotent remove — unknown rooms and sessions are a no-op.
    pub async fn unbind(&self, room_id: Uuid, session_id: Uuid) {
        let mut rooms = self.inner.write().await;
        if let Some(members) = rooms.get_mut(&room_id) {
            members.remove(&session_id);
            if members.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// Drop the session from every room it is bound to.
    pub async fn unbind_all(&self, session_id: Uuid) {
        let mut rooms = self.inner.write().await;
        rooms.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });
    }

    /// Snapshot of the sessions currently bound to a room.
    pub async fn members_of(&self, room_id: Uuid) -> Vec<(Uuid, SessionSender)> {
        self.inner
            .read()
            .await
            .get(&room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fan an event out to every session bound to the room, the sender
    /// included. A closed receiver just drops its copy.
    pub async fn broadcast(&self, room_id: Uuid, event: GatewayEvent) {
        for (_, tx) in self.members_of(room_id).await {
            let _ = tx.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (Uuid, SessionSender, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    fn reply(room_id: Uuid, body: &str) -> GatewayEvent {
        GatewayEvent::Reply {
            room_id,
            body: body.to_string(),
            sender: whisper_types::models::MemberSnapshot {
                user_id: Uuid::new_v4(),
                name: "alice".to_string(),
                pfp: String::new(),
            },
            sent_on: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn bind_is_idempotent() {
        let rooms = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (sid, tx, _rx) = session();

        rooms.bind(room, sid, tx.clone()).await;
        rooms.bind(room, sid, tx).await;

        assert_eq!(rooms.members_of(room).await.len(), 1);
    }

    #[tokio::test]
    async fn unbind_is_idempotent_and_tolerates_unknown_rooms() {
        let rooms = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (sid, tx, _rx) = session();

        // Leaving a room never joined is a no-op.
        rooms.unbind(room, sid).await;

        rooms.bind(room, sid, tx).await;
        rooms.unbind(room, sid).await;
        rooms.unbind(room, sid).await;

        assert!(rooms.members_of(room).await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_all_bound_sessions_and_no_others() {
        let rooms = RoomRegistry::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let (s1, tx1, mut rx1) = session();
        let (s2, tx2, mut rx2) = session();
        let (s3, tx3, mut rx3) = session();

        rooms.bind(room_a, s1, tx1).await;
        rooms.bind(room_a, s2, tx2).await;
        rooms.bind(room_b, s3, tx3).await;

        rooms.broadcast(room_a, reply(room_a, "hi")).await;

        assert!(matches!(rx1.try_recv(), Ok(GatewayEvent::Reply { body, .. }) if body == "hi"));
        assert!(matches!(rx2.try_recv(), Ok(GatewayEvent::Reply { body, .. }) if body == "hi"));
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_unbinds_everywhere() {
        let rooms = RoomRegistry::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let (sid, tx, _rx) = session();

        rooms.bind(room_a, sid, tx.clone()).await;
        rooms.bind(room_b, sid, tx).await;

        rooms.unbind_all(sid).await;

        assert!(rooms.members_of(room_a).await.is_empty());
        assert!(rooms.members_of(room_b).await.is_empty());
    }
}
