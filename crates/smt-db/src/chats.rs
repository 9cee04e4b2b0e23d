use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use smt_types::models::{ChatKind, ChatSummary, Message};
use smt_types::{GLOBAL_SCOPE, GLOBAL_SCOPE_NAME};

use crate::messages::MessageStore;
use crate::models::{ChatHistory, ChatRow, GroupChat};
use crate::queries::{require_user_id, user_id_by_username};
use crate::{Database, DbError, Result};

impl Database {
    /// Direct chat between two users, created atomically with both membership
    /// rows. An existing direct chat for the pair is returned instead of a new one.
    pub fn create_direct_chat(&self, user_a: &str, user_b: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (a, b) = match (user_id_by_username(&tx, user_a)?, user_id_by_username(&tx, user_b)?) {
                (Some(a), Some(b)) if a != b => (a, b),
                _ => return Err(DbError::SelfOrMissingUser),
            };
            let name = format!("Chat between {} and {}", user_a, user_b);
            let chat_id = ensure_direct_chat(&tx, a, b, &name)?;
            tx.commit()?;
            Ok(chat_id)
        })
    }

    /// Creates a group owned by `owner`. Member names that do not resolve are
    /// skipped; at least one other member must resolve or nothing is created.
    pub fn create_group_chat(&self, owner: &str, name: &str, members: &[String]) -> Result<GroupChat> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::Validation("group name is required".into()));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let owner_id = require_user_id(&tx, owner)?;

            let chat_id = insert_chat(&tx, name, ChatKind::Group)?;
            add_member(&tx, chat_id, owner_id)?;

            let mut added = vec![owner.to_string()];
            let mut seen: HashSet<&str> = HashSet::from([owner]);
            for member in members {
                let member = member.trim();
                if !seen.insert(member) {
                    continue;
                }
                match user_id_by_username(&tx, member)? {
                    Some(user_id) => {
                        add_member(&tx, chat_id, user_id)?;
                        added.push(member.to_string());
                    }
                    None => warn!("Group {:?}: skipping unknown member {:?}", name, member),
                }
            }

            if added.len() < 2 {
                // Dropping the transaction rolls back the chat and owner rows.
                return Err(DbError::Validation(
                    "a group chat needs at least one existing member besides the owner".into(),
                ));
            }

            tx.commit()?;
            info!("{} created group chat {} ({} members)", owner, chat_id, added.len());
            Ok(GroupChat {
                chat_id,
                members: added,
            })
        })
    }

    /// Every chat `user` belongs to, named from their point of view.
    pub fn list_chats_for(&self, user: &str) -> Result<Vec<ChatSummary>> {
        self.with_conn(|conn| {
            let user_id = require_user_id(conn, user)?;
            let mut stmt = conn.prepare(
                "SELECT c.chat_id, c.name, c.kind,
                        (SELECT u.username
                         FROM chat_users o
                         JOIN users u ON u.id = o.user_id
                         WHERE o.chat_id = c.chat_id AND o.user_id != ?1
                         LIMIT 1)
                 FROM chats c
                 JOIN chat_users cu ON cu.chat_id = c.chat_id
                 WHERE cu.user_id = ?1
                 ORDER BY c.chat_id",
            )?;

            let chats = stmt
                .query_map([user_id], |row| {
                    let chat = ChatRow {
                        chat_id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                    };
                    let peer: Option<String> = row.get(3)?;
                    Ok(ChatSummary {
                        display_name: display_name(&chat, peer),
                        chat_id: chat.chat_id,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(chats)
        })
    }

    /// Membership guard. The global scope is open to everyone; any other scope
    /// requires a `chat_users` row for `user`.
    pub fn ensure_scope_access(&self, user: &str, chat_id: i64) -> Result<()> {
        if chat_id == GLOBAL_SCOPE {
            return Ok(());
        }
        if chat_id < 0 {
            return Err(DbError::Validation(format!("invalid chat id {}", chat_id)));
        }

        self.with_conn(|conn| {
            let user_id = require_user_id(conn, user)?;
            if is_member(conn, chat_id, user_id)? {
                Ok(())
            } else {
                Err(DbError::NotMember(chat_id))
            }
        })
    }

    /// Name of a chat as `user` sees it.
    pub fn chat_display_name(&self, user: &str, chat_id: i64) -> Result<String> {
        if chat_id == GLOBAL_SCOPE {
            return Ok(GLOBAL_SCOPE_NAME.to_string());
        }

        self.with_conn(|conn| {
            let user_id = require_user_id(conn, user)?;
            let chat = conn
                .query_row(
                    "SELECT chat_id, name, kind FROM chats WHERE chat_id = ?1",
                    [chat_id],
                    |row| {
                        Ok(ChatRow {
                            chat_id: row.get(0)?,
                            name: row.get(1)?,
                            kind: row.get(2)?,
                        })
                    },
                )
                .optional()?
                .ok_or_else(|| DbError::NotFound(format!("chat {}", chat_id)))?;

            let peer: Option<String> = conn
                .query_row(
                    "SELECT u.username
                     FROM chat_users o
                     JOIN users u ON u.id = o.user_id
                     WHERE o.chat_id = ?1 AND o.user_id != ?2
                     LIMIT 1",
                    (chat_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;

            Ok(display_name(&chat, peer))
        })
    }

    /// Recent history of a scope plus its display name. `None` means the global
    /// scope. Membership is not checked here: callers run
    /// [`Database::ensure_scope_access`] first.
    pub fn list_messages(&self, user: &str, chat_id: Option<i64>, limit: u32) -> Result<ChatHistory> {
        let scope = chat_id.unwrap_or(GLOBAL_SCOPE);
        let chat_name = self.chat_display_name(user, scope)?;
        let messages: Vec<Message> = self.replay(scope, limit)?;
        Ok(ChatHistory {
            chat_name,
            messages,
        })
    }

    /// Member usernames of a chat, in join order.
    #[cfg(test)]
    pub fn chat_members(&self, chat_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username
                 FROM chat_users cu
                 JOIN users u ON u.id = cu.user_id
                 WHERE cu.chat_id = ?1
                 ORDER BY cu.rowid",
            )?;
            let names = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }
}

/// Returns the direct chat of the pair, creating it (chat row plus two
/// membership rows) when none exists. Runs inside the caller's transaction.
pub(crate) fn ensure_direct_chat(conn: &Connection, a: i64, b: i64, name: &str) -> Result<i64> {
    if let Some(chat_id) = find_direct_chat(conn, a, b)? {
        return Ok(chat_id);
    }

    let chat_id = insert_chat(conn, name, ChatKind::Direct)?;
    add_member(conn, chat_id, a)?;
    add_member(conn, chat_id, b)?;
    Ok(chat_id)
}

fn find_direct_chat(conn: &Connection, a: i64, b: i64) -> Result<Option<i64>> {
    let chat_id = conn
        .query_row(
            "SELECT c.chat_id
             FROM chats c
             JOIN chat_users x ON x.chat_id = c.chat_id AND x.user_id = ?1
             JOIN chat_users y ON y.chat_id = c.chat_id AND y.user_id = ?2
             WHERE c.kind = 'direct'
             ORDER BY c.chat_id
             LIMIT 1",
            (a, b),
            |row| row.get(0),
        )
        .optional()?;
    Ok(chat_id)
}

fn insert_chat(conn: &Connection, name: &str, kind: ChatKind) -> Result<i64> {
    conn.execute(
        "INSERT INTO chats (name, kind) VALUES (?1, ?2)",
        (name, kind.as_str()),
    )?;
    Ok(conn.last_insert_rowid())
}

fn add_member(conn: &Connection, chat_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO chat_users (chat_id, user_id) VALUES (?1, ?2)",
        (chat_id, user_id),
    )?;
    Ok(())
}

fn is_member(conn: &Connection, chat_id: i64, user_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM chat_users WHERE chat_id = ?1 AND user_id = ?2",
            (chat_id, user_id),
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn display_name(chat: &ChatRow, peer: Option<String>) -> String {
    if chat.kind == ChatKind::Direct.as_str() {
        peer.unwrap_or_else(|| chat.name.clone())
    } else {
        chat.name.clone()
    }
}
