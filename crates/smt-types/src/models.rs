use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable chat message. `chat_scope` 0 is the global stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub author: String,
    pub body: String,
    pub chat_scope: i64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(author: impl Into<String>, body: impl Into<String>, chat_scope: i64) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            chat_scope,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// One entry of a user's chat list, named from that user's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub display_name: String,
    pub chat_id: i64,
}
