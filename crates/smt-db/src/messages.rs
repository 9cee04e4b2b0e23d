use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use smt_types::models::Message;

use crate::queries::require_user_id;
use crate::{Database, Result};

/// Durable, append-only message log partitioned by chat scope.
///
/// Scope 0 is always queryable. Membership for any other scope is checked by
/// the caller (see [`Database::ensure_scope_access`]), never by the store.
pub trait MessageStore: Send + Sync + 'static {
    /// Persists one message. Fails with `NotFound` for an unknown author and
    /// `Storage` when the write itself fails.
    fn append(&self, message: &Message) -> Result<()>;

    /// The `limit` most recent messages of `chat_scope`, oldest first.
    fn replay(&self, chat_scope: i64, limit: u32) -> Result<Vec<Message>>;
}

impl MessageStore for Database {
    fn append(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| insert_message(conn, message))
    }

    fn replay(&self, chat_scope: i64, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_recent_messages(conn, chat_scope, limit))
    }
}

fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
    let writer_id = require_user_id(conn, &message.author)?;
    conn.execute(
        "INSERT INTO messages (id_writer, message, chat_recv_id, time) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            writer_id,
            message.body,
            message.chat_scope,
            message.created_at.timestamp_micros()
        ],
    )?;
    Ok(())
}

fn query_recent_messages(conn: &Connection, chat_scope: i64, limit: u32) -> Result<Vec<Message>> {
    // Newest `limit` rows first, then flipped so callers get chronological order.
    // Equal timestamps fall back to insertion order.
    let mut stmt = conn.prepare(
        "SELECT u.username, m.message, m.chat_recv_id, m.time
         FROM messages m
         JOIN users u ON m.id_writer = u.id
         WHERE m.chat_recv_id = ?1
         ORDER BY m.time DESC, m.id DESC
         LIMIT ?2",
    )?;

    let mut rows = stmt
        .query_map(rusqlite::params![chat_scope, limit], |row| {
            let micros: i64 = row.get(3)?;
            Ok(Message {
                author: row.get(0)?,
                body: row.get(1)?,
                chat_scope: row.get(2)?,
                created_at: from_micros(micros),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(|| {
        warn!("Corrupt message time {}", micros);
        DateTime::<Utc>::default()
    })
}
