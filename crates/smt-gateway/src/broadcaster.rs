use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tracing::{debug, error};

use smt_db::MessageStore;
use smt_types::events::WireMessage;
use smt_types::models::Message;

use crate::error::GatewayError;
use crate::registry::{ConnectionRegistry, Visit};

/// Single fan-out point for chat messages.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    store: Arc<dyn MessageStore>,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn MessageStore>) -> Self {
        Self { registry, store }
    }

    /// Persist `message`, then push it to every admitted connection. Nothing is
    /// delivered when the write fails. The store call runs on the blocking pool.
    pub async fn send(&self, message: Message) -> Result<Visit, GatewayError> {
        let store = self.store.clone();
        let message = tokio::task::spawn_blocking(move || {
            store.append(&message).map(|()| message)
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            GatewayError::Join(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to persist message: {}", e);
            GatewayError::Storage(e)
        })?;

        self.publish(&WireMessage::from(message))
    }

    /// Deliver to every connection registered right now, in no particular
    /// order. Never waits on a client: connections whose queue is full or
    /// closed are deregistered.
    ///
    /// The audience does not depend on `chat_recv_id`: frames for a private or
    /// group chat reach non-members too, and clients filter by scope. Live
    /// private traffic is therefore not confidential. Membership only gates
    /// sending into a chat and reading its stored history.
    pub fn publish(&self, message: &WireMessage) -> Result<Visit, GatewayError> {
        let frame = Utf8Bytes::from(serde_json::to_string(message)?);
        let outcome = self.registry.for_each(|conn| conn.deliver(frame.clone()));
        debug!(
            "Published message from {} to scope {}: {} delivered, {} dropped",
            message.username, message.chat_recv_id, outcome.delivered, outcome.dropped
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smt_db::{Database, DbError};
    use smt_types::GLOBAL_SCOPE;

    struct BrokenStore;

    impl MessageStore for BrokenStore {
        fn append(&self, _message: &Message) -> smt_db::Result<()> {
            Err(DbError::LockPoisoned)
        }

        fn replay(&self, _chat_scope: i64, _limit: u32) -> smt_db::Result<Vec<Message>> {
            Ok(vec![])
        }
    }

    fn wire(body: &str) -> WireMessage {
        WireMessage {
            username: "alice".into(),
            message: body.into(),
            chat_recv_id: GLOBAL_SCOPE,
        }
    }

    fn decode(frame: Utf8Bytes) -> WireMessage {
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn publish_reaches_every_registered_connection() {
        let registry = ConnectionRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone(), Arc::new(BrokenStore));

        let mut receivers = Vec::new();
        for name in ["alice", "bob", "carol", "dave"] {
            let (_reg, rx) = registry.admit(name).unwrap();
            receivers.push(rx);
        }

        let outcome = broadcaster.publish(&wire("hello")).unwrap();
        assert_eq!(outcome, Visit { delivered: 4, dropped: 0 });

        for rx in &mut receivers {
            assert_eq!(decode(rx.recv().await.unwrap()), wire("hello"));
        }
    }

    #[tokio::test]
    async fn removed_and_failed_connections_miss_later_messages() {
        let registry = ConnectionRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone(), Arc::new(BrokenStore));

        let (_a, mut rx_a) = registry.admit("alice").unwrap();
        let (b, mut rx_b) = registry.admit("bob").unwrap();
        let (c, rx_c) = registry.admit("carol").unwrap();

        registry.remove(&b);
        drop(rx_c);

        let outcome = broadcaster.publish(&wire("first")).unwrap();
        assert_eq!(outcome, Visit { delivered: 1, dropped: 1 });
        assert!(!registry.contains(&c));

        let outcome = broadcaster.publish(&wire("second")).unwrap();
        assert_eq!(outcome, Visit { delivered: 1, dropped: 0 });

        assert_eq!(decode(rx_a.recv().await.unwrap()).message, "first");
        assert_eq!(decode(rx_a.recv().await.unwrap()).message, "second");
        // Bob's sender was dropped on removal, so his queue is closed and empty.
        assert!(rx_b.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_reader_does_not_stall_the_others() {
        let registry = ConnectionRegistry::new(2);
        let broadcaster = Broadcaster::new(registry.clone(), Arc::new(BrokenStore));

        let (slow, _rx_slow) = registry.admit("slow").unwrap();
        let (_fast, mut rx_fast) = registry.admit("fast").unwrap();

        for i in 0..5 {
            broadcaster.publish(&wire(&format!("m{}", i))).unwrap();
            // The fast reader keeps up.
            assert_eq!(decode(rx_fast.recv().await.unwrap()).message, format!("m{}", i));
        }

        assert!(!registry.contains(&slow));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn send_persists_before_delivering() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("alice", "hash").unwrap();

        let registry = ConnectionRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone(), db.clone());
        let (_reg, mut rx) = registry.admit("bob").unwrap();

        broadcaster
            .send(Message::new("alice", "stored", GLOBAL_SCOPE))
            .await
            .unwrap();

        assert_eq!(decode(rx.recv().await.unwrap()), wire("stored"));
        let replay = db.replay(GLOBAL_SCOPE, 50).unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].body, "stored");
    }

    #[tokio::test]
    async fn storage_failure_delivers_nothing_and_keeps_connections() {
        let registry = ConnectionRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone(), Arc::new(BrokenStore));
        let (reg, mut rx) = registry.admit("bob").unwrap();

        let err = broadcaster
            .send(Message::new("alice", "lost", GLOBAL_SCOPE))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Storage(_)));

        assert!(registry.contains(&reg));
        assert!(rx.try_recv().is_err());
    }
}
