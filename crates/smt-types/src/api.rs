use serde::{Deserialize, Serialize};

use crate::events::WireMessage;
use crate::models::ChatSummary;

// -- Session --

/// Session token claims. Issued by the session gate, validated on every
/// protected request and on the live-connection upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

/// Authenticated caller, resolved once at the auth gate and passed down
/// explicitly to every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

// -- Friends --

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestBody {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub message: String,
    pub chat_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendsWithChatsResponse {
    pub friends: Vec<ChatSummary>,
}

// -- Chats --

#[derive(Debug, Deserialize)]
pub struct ChatMessagesQuery {
    pub chat_id: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessagesResponse {
    pub messages: Vec<WireMessage>,
    pub chat_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupChatRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// `members` lists who actually joined, owner included. Unknown usernames
/// from the request are absent.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupChatResponse {
    pub chat_id: i64,
    pub members: Vec<String>,
}

// -- Generic --

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

impl StatusResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
