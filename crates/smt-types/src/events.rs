use serde::{Deserialize, Serialize};

use crate::GLOBAL_SCOPE;
use crate::models::Message;

/// A chat message as it travels over the live connection, in both directions.
///
/// Inbound frames may omit `username` (the server always overwrites it with the
/// admitted identity) and `chat_recv_id` (defaults to the global scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub username: String,
    pub message: String,
    #[serde(default = "global_scope")]
    pub chat_recv_id: i64,
}

fn global_scope() -> i64 {
    GLOBAL_SCOPE
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            username: msg.author.clone(),
            message: msg.body.clone(),
            chat_recv_id: msg.chat_scope,
        }
    }
}

impl From<Message> for WireMessage {
    fn from(msg: Message) -> Self {
        Self {
            username: msg.author,
            message: msg.body,
            chat_recv_id: msg.chat_scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_defaults() {
        let msg: WireMessage = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(msg.username, "");
        assert_eq!(msg.chat_recv_id, GLOBAL_SCOPE);
    }

    #[test]
    fn wire_field_names() {
        let msg = WireMessage {
            username: "alice".into(),
            message: "hello".into(),
            chat_recv_id: 7,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"username": "alice", "message": "hello", "chat_recv_id": 7})
        );
    }
}
