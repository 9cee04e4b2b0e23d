//! Friend graph: per unordered pair of users, `none -> pending -> {accepted | none}`.
//!
//! Edges are stored directionally (`senduser_id -> recvuser_id`) but at most one
//! edge may exist per pair, so every existence check looks at both orderings.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::chats::ensure_direct_chat;
use crate::queries::{require_user_id, user_id_by_username};
use crate::{Database, DbError, Result};

impl Database {
    /// Creates a pending edge `from -> to`.
    pub fn send_friend_request(&self, from: &str, to: &str) -> Result<()> {
        self.with_conn(|conn| {
            let (from_id, to_id) = match (
                user_id_by_username(conn, from)?,
                user_id_by_username(conn, to)?,
            ) {
                (Some(a), Some(b)) if a != b => (a, b),
                _ => return Err(DbError::SelfOrMissingUser),
            };

            if edge_between(conn, from_id, to_id)?.is_some() {
                return Err(DbError::AlreadyExists(format!(
                    "friend relation between {} and {}",
                    from, to
                )));
            }

            conn.execute(
                "INSERT INTO friends (senduser_id, recvuser_id) VALUES (?1, ?2)",
                (from_id, to_id),
            )?;
            info!("{} sent a friend request to {}", from, to);
            Ok(())
        })
    }

    /// Usernames with a pending request directed at `user`, oldest first.
    pub fn pending_friend_requests(&self, user: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let user_id = require_user_id(conn, user)?;
            let mut stmt = conn.prepare(
                "SELECT u.username
                 FROM friends f
                 JOIN users u ON f.senduser_id = u.id
                 WHERE f.recvuser_id = ?1 AND f.accepted = 0
                 ORDER BY f.id",
            )?;
            let names = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Accepts the pending edge `sender -> current` and returns the direct chat
    /// of the pair. The edge flip and the chat rows commit together.
    pub fn accept_friend_request(&self, current: &str, sender: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current_id = require_user_id(&tx, current)?;
            let sender_id = user_id_by_username(&tx, sender)?
                .ok_or_else(|| pending_not_found(sender))?;

            let updated = tx.execute(
                "UPDATE friends SET accepted = 1
                 WHERE senduser_id = ?1 AND recvuser_id = ?2 AND accepted = 0",
                (sender_id, current_id),
            )?;
            if updated == 0 {
                return Err(pending_not_found(sender));
            }

            let name = format!("Chat between {} and {}", current, sender);
            let chat_id = ensure_direct_chat(&tx, current_id, sender_id, &name)?;

            tx.commit()?;
            info!("{} accepted {}'s friend request (chat {})", current, sender, chat_id);
            Ok(chat_id)
        })
    }

    /// Deletes the pending edge `sender -> current`.
    pub fn reject_friend_request(&self, current: &str, sender: &str) -> Result<()> {
        self.with_conn(|conn| {
            let current_id = require_user_id(conn, current)?;
            let sender_id = user_id_by_username(conn, sender)?
                .ok_or_else(|| pending_not_found(sender))?;

            let deleted = conn.execute(
                "DELETE FROM friends
                 WHERE senduser_id = ?1 AND recvuser_id = ?2 AND accepted = 0",
                (sender_id, current_id),
            )?;
            if deleted == 0 {
                return Err(pending_not_found(sender));
            }

            info!("{} rejected {}'s friend request", current, sender);
            Ok(())
        })
    }

    /// Accepted flag of the edge between two users in either direction, if any.
    #[cfg(test)]
    pub fn friend_edge(&self, a: &str, b: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            match (user_id_by_username(conn, a)?, user_id_by_username(conn, b)?) {
                (Some(a_id), Some(b_id)) => edge_between(conn, a_id, b_id),
                _ => Ok(None),
            }
        })
    }
}

/// `Some(accepted)` when the pair has an edge in either direction.
fn edge_between(conn: &Connection, a: i64, b: i64) -> Result<Option<bool>> {
    let accepted = conn
        .query_row(
            "SELECT accepted
             FROM friends
             WHERE (senduser_id = ?1 AND recvuser_id = ?2)
                OR (senduser_id = ?2 AND recvuser_id = ?1)",
            (a, b),
            |row| row.get(0),
        )
        .optional()?;
    Ok(accepted)
}

fn pending_not_found(sender: &str) -> DbError {
    DbError::NotFound(format!("pending friend request from {}", sender))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with(users: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for u in users {
            db.create_user(u, "hash").unwrap();
        }
        db
    }

    fn member_count(db: &Database, chat_id: i64) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chat_users WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn duplicate_request_is_rejected_in_both_directions() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();

        let again = db.send_friend_request("alice", "bob").unwrap_err();
        assert!(matches!(again, DbError::AlreadyExists(_)));

        let reverse = db.send_friend_request("bob", "alice").unwrap_err();
        assert!(matches!(reverse, DbError::AlreadyExists(_)));
    }

    #[test]
    fn request_to_self_or_unknown_user_fails() {
        let db = db_with(&["alice"]);
        assert!(matches!(
            db.send_friend_request("alice", "alice"),
            Err(DbError::SelfOrMissingUser)
        ));
        assert!(matches!(
            db.send_friend_request("alice", "ghost"),
            Err(DbError::SelfOrMissingUser)
        ));
        assert!(matches!(
            db.send_friend_request("ghost", "alice"),
            Err(DbError::SelfOrMissingUser)
        ));
    }

    #[test]
    fn pending_lists_only_incoming_unaccepted_requests() {
        let db = db_with(&["alice", "bob", "carol"]);
        db.send_friend_request("alice", "carol").unwrap();
        db.send_friend_request("bob", "carol").unwrap();
        db.send_friend_request("carol", "dave").unwrap_err();

        assert_eq!(
            db.pending_friend_requests("carol").unwrap(),
            vec!["alice".to_string(), "bob".to_string()]
        );
        assert!(db.pending_friend_requests("alice").unwrap().is_empty());

        db.accept_friend_request("carol", "alice").unwrap();
        assert_eq!(db.pending_friend_requests("carol").unwrap(), vec!["bob".to_string()]);
    }

    #[test]
    fn accept_creates_one_direct_chat_with_two_members() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();

        let chat_id = db.accept_friend_request("bob", "alice").unwrap();
        assert_eq!(member_count(&db, chat_id), 2);
        assert_eq!(db.friend_edge("alice", "bob").unwrap(), Some(true));

        let again = db.accept_friend_request("bob", "alice").unwrap_err();
        assert!(matches!(again, DbError::NotFound(_)));
    }

    #[test]
    fn failed_chat_creation_rolls_back_the_accept() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();

        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_membership BEFORE INSERT ON chat_users
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.accept_friend_request("bob", "alice").unwrap_err();
        assert!(matches!(err, DbError::Storage(_)));

        assert_eq!(db.friend_edge("alice", "bob").unwrap(), Some(false));
        let chats: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(chats, 0);
        assert_eq!(db.pending_friend_requests("bob").unwrap(), vec!["alice".to_string()]);

        // Once storage recovers the same request can still be accepted.
        db.with_conn(|conn| {
            conn.execute_batch("DROP TRIGGER fail_membership;")?;
            Ok(())
        })
        .unwrap();
        let chat_id = db.accept_friend_request("bob", "alice").unwrap();
        assert_eq!(member_count(&db, chat_id), 2);
    }

    #[test]
    fn only_the_receiver_can_accept() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();

        let err = db.accept_friend_request("alice", "bob").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        assert_eq!(db.friend_edge("alice", "bob").unwrap(), Some(false));
    }

    #[test]
    fn reject_removes_the_edge() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();

        db.reject_friend_request("bob", "alice").unwrap();
        assert!(db.friend_edge("alice", "bob").unwrap().is_none());

        let missing = db.reject_friend_request("bob", "alice").unwrap_err();
        assert!(matches!(missing, DbError::NotFound(_)));

        // The pair is back at `none`, so a fresh request is allowed either way.
        db.send_friend_request("bob", "alice").unwrap();
    }

    #[test]
    fn reject_does_not_touch_accepted_edges() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();
        db.accept_friend_request("bob", "alice").unwrap();

        let err = db.reject_friend_request("bob", "alice").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        assert_eq!(db.friend_edge("alice", "bob").unwrap(), Some(true));
    }

    #[test]
    fn re_established_friendship_reuses_the_direct_chat() {
        let db = db_with(&["alice", "bob"]);
        db.send_friend_request("alice", "bob").unwrap();
        let first = db.accept_friend_request("bob", "alice").unwrap();

        db.with_conn(|conn| {
            conn.execute("DELETE FROM friends", [])?;
            Ok(())
        })
        .unwrap();

        db.send_friend_request("bob", "alice").unwrap();
        let second = db.accept_friend_request("alice", "bob").unwrap();

        assert_eq!(first, second);
        assert_eq!(db.list_chats_for("alice").unwrap().len(), 1);
    }
}
