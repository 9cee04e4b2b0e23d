use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use smt_types::DEFAULT_REPLAY_LIMIT;
use smt_types::api::{
    ChatMessagesQuery, ChatMessagesResponse, CreateGroupChatRequest, CreateGroupChatResponse,
    FriendsWithChatsResponse, Identity,
};
use smt_types::events::WireMessage;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Largest history page a client may ask for.
const MAX_HISTORY_LIMIT: u32 = 200;

/// GET /friends-with-chats
pub async fn friends_with_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let friends = blocking(&state, move |db| db.list_chats_for(&identity.username)).await?;
    Ok(Json(FriendsWithChatsResponse { friends }))
}

/// GET /chat-messages?chat_id=&limit= — missing or 0 `chat_id` is the global
/// scope; any other id requires membership.
pub async fn chat_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ChatMessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_REPLAY_LIMIT).min(MAX_HISTORY_LIMIT);

    let history = blocking(&state, move |db| {
        if let Some(chat_id) = query.chat_id {
            db.ensure_scope_access(&identity.username, chat_id)?;
        }
        db.list_messages(&identity.username, query.chat_id, limit)
    })
    .await?;

    Ok(Json(ChatMessagesResponse {
        messages: history.messages.into_iter().map(WireMessage::from).collect(),
        chat_name: history.chat_name,
    }))
}

/// POST /create-group-chat
pub async fn create_group_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("group name is required".into()));
    }
    if req.members.is_empty() {
        return Err(ApiError::Validation("at least one member is required".into()));
    }

    let group = blocking(&state, move |db| {
        db.create_group_chat(&identity.username, &req.name, &req.members)
    })
    .await?;

    Ok(Json(CreateGroupChatResponse {
        chat_id: group.chat_id,
        members: group.members,
    }))
}
