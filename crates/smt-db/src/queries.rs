use rusqlite::{Connection, OptionalExtension};

use crate::models::UserRow;
use crate::{Database, DbError, Result};

impl Database {
    // -- Users --

    /// Inserts a user and returns its id. `password_hash` must already be hashed.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)
                 ON CONFLICT(username) DO NOTHING",
                (username, password_hash),
            )?;
            if inserted == 0 {
                return Err(DbError::AlreadyExists(format!("user {}", username)));
            }
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }
}

pub(crate) fn user_id_by_username(conn: &Connection, username: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

/// Resolves a username that must exist.
pub(crate) fn require_user_id(conn: &Connection, username: &str) -> Result<i64> {
    user_id_by_username(conn, username)?.ok_or_else(|| DbError::NotFound(format!("user {}", username)))
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}
