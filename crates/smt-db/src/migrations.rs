use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS friends (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            senduser_id INTEGER NOT NULL REFERENCES users(id),
            recvuser_id INTEGER NOT NULL REFERENCES users(id),
            accepted    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(senduser_id, recvuser_id)
        );

        CREATE INDEX IF NOT EXISTS idx_friends_recv
            ON friends(recvuser_id, accepted);

        CREATE TABLE IF NOT EXISTS chats (
            chat_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            kind        TEXT NOT NULL CHECK (kind IN ('direct', 'group')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chat_users (
            chat_id     INTEGER NOT NULL REFERENCES chats(chat_id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_users_user
            ON chat_users(user_id);

        -- chat_recv_id 0 is the global scope and has no chats row
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            id_writer       INTEGER NOT NULL REFERENCES users(id),
            message         TEXT NOT NULL,
            chat_recv_id    INTEGER NOT NULL DEFAULT 0,
            time            INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_scope
            ON messages(chat_recv_id, time);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
