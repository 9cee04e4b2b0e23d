use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GatewayError, TransportError};

/// Default bound of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

/// Handle returned by [`ConnectionRegistry::admit`]. Identifies one admitted
/// connection; removing it twice is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub conn_id: Uuid,
    pub username: String,
}

/// Receiving half of a connection's outbound queue. Yields `None` once the
/// registry has dropped the connection.
pub type Outbound = mpsc::Receiver<Utf8Bytes>;

struct Entry {
    username: String,
    tx: mpsc::Sender<Utf8Bytes>,
}

/// One admitted connection as seen by a [`ConnectionRegistry::for_each`] visitor.
pub struct ConnectionHandle<'a> {
    pub conn_id: Uuid,
    pub username: &'a str,
    tx: &'a mpsc::Sender<Utf8Bytes>,
}

impl ConnectionHandle<'_> {
    /// Queue a frame without waiting. A full queue counts as a failed delivery:
    /// the policy for slow readers is disconnect-on-overflow.
    pub fn deliver(&self, frame: Utf8Bytes) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Outcome of one pass over the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visit {
    pub delivered: usize,
    pub dropped: usize,
}

/// Live connections keyed by connection id. Cloning shares the same registry.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Entry>>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Admit a connection for an authenticated user. Returns the registration
    /// and the queue the connection's writer must drain.
    pub fn admit(&self, username: &str) -> Result<(Registration, Outbound), GatewayError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(GatewayError::Unauthenticated);
        }

        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                conn_id,
                Entry {
                    username: username.to_string(),
                    tx,
                },
            );

        debug!("Admitted {} as connection {}", username, conn_id);
        Ok((
            Registration {
                conn_id,
                username: username.to_string(),
            },
            rx,
        ))
    }

    /// Deregister a connection. Returns whether it was still registered.
    pub fn remove(&self, registration: &Registration) -> bool {
        let removed = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&registration.conn_id)
            .is_some();

        if removed {
            debug!(
                "Removed connection {} ({})",
                registration.conn_id, registration.username
            );
        }
        removed
    }

    /// Visit every admitted connection. A visitor error affects only that
    /// connection: it is deregistered after the pass and iteration continues.
    pub fn for_each<F>(&self, mut visit: F) -> Visit
    where
        F: FnMut(&ConnectionHandle<'_>) -> Result<(), TransportError>,
    {
        let mut outcome = Visit::default();
        let mut failed = Vec::new();

        {
            let entries = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            for (conn_id, entry) in entries.iter() {
                let handle = ConnectionHandle {
                    conn_id: *conn_id,
                    username: &entry.username,
                    tx: &entry.tx,
                };
                match visit(&handle) {
                    Ok(()) => outcome.delivered += 1,
                    Err(e) => {
                        warn!("Dropping connection {} ({}): {}", conn_id, entry.username, e);
                        failed.push(*conn_id);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut entries = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            for conn_id in &failed {
                if entries.remove(conn_id).is_some() {
                    outcome.dropped += 1;
                }
            }
            info!("{} connection(s) dropped, {} remaining", outcome.dropped, entries.len());
        }

        outcome
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, registration: &Registration) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&registration.conn_id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_QUEUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_requires_identity() {
        let registry = ConnectionRegistry::default();
        assert!(matches!(registry.admit(""), Err(GatewayError::Unauthenticated)));
        assert!(matches!(registry.admit("   "), Err(GatewayError::Unauthenticated)));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::default();
        let (reg, _rx) = registry.admit("alice").unwrap();
        assert!(registry.contains(&reg));

        assert!(registry.remove(&reg));
        assert!(!registry.remove(&reg));
        assert!(registry.is_empty());
    }

    #[test]
    fn same_user_may_hold_several_connections() {
        let registry = ConnectionRegistry::default();
        let (a, _rx_a) = registry.admit("alice").unwrap();
        let (b, _rx_b) = registry.admit("alice").unwrap();
        assert_ne!(a.conn_id, b.conn_id);
        assert_eq!(registry.len(), 2);

        registry.remove(&a);
        assert!(registry.contains(&b));
    }

    #[test]
    fn failing_visit_removes_only_that_connection() {
        let registry = ConnectionRegistry::default();
        let (alice, _rx_a) = registry.admit("alice").unwrap();
        let (bob, _rx_b) = registry.admit("bob").unwrap();
        let (carol, _rx_c) = registry.admit("carol").unwrap();

        let mut visited = 0;
        let outcome = registry.for_each(|conn| {
            visited += 1;
            if conn.username == "bob" {
                Err(TransportError::Closed)
            } else {
                Ok(())
            }
        });

        assert_eq!(visited, 3);
        assert_eq!(outcome, Visit { delivered: 2, dropped: 1 });
        assert!(registry.contains(&alice));
        assert!(!registry.contains(&bob));
        assert!(registry.contains(&carol));
    }

    #[test]
    fn deliver_reports_overflow_and_closed_queues() {
        let registry = ConnectionRegistry::new(1);
        let (_slow, _rx_slow) = registry.admit("slow").unwrap();

        let first = registry.for_each(|conn| conn.deliver("one".into()));
        assert_eq!(first, Visit { delivered: 1, dropped: 0 });

        let second = registry.for_each(|conn| conn.deliver("two".into()));
        assert_eq!(second, Visit { delivered: 0, dropped: 1 });
        assert!(registry.is_empty());

        let (_gone, rx_gone) = registry.admit("gone").unwrap();
        drop(rx_gone);
        let third = registry.for_each(|conn| conn.deliver("three".into()));
        assert_eq!(third, Visit { delivered: 0, dropped: 1 });
    }
}
