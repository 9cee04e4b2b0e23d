//! Database row types — these map directly to SQLite rows.
//! Distinct from smt-types API models to keep the DB layer independent.

#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct ChatRow {
    pub chat_id: i64,
    pub name: String,
    pub kind: String,
}

/// Result of a group creation: the chat and the members that were actually added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChat {
    pub chat_id: i64,
    pub members: Vec<String>,
}

/// Recent history of one chat scope together with the name its reader sees.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    pub chat_name: String,
    pub messages: Vec<smt_types::models::Message>,
}
