use axum::{Extension, Json, extract::State, response::IntoResponse};

use smt_types::api::{
    AcceptResponse, FriendRequestBody, Identity, PendingRequestsResponse, StatusResponse,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

fn target(body: &FriendRequestBody) -> Result<String, ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    Ok(username.to_string())
}

/// POST /frrequest
pub async fn send_friend_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let to = target(&body)?;
    if to == identity.username {
        return Err(ApiError::Validation(
            "cannot send a friend request to yourself".into(),
        ));
    }

    blocking(&state, move |db| db.send_friend_request(&identity.username, &to)).await?;
    Ok(Json(StatusResponse::new("Friend request sent successfully")))
}

/// GET /friend-requests
pub async fn list_friend_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let requests =
        blocking(&state, move |db| db.pending_friend_requests(&identity.username)).await?;
    Ok(Json(PendingRequestsResponse { requests }))
}

/// POST /accept-request
pub async fn accept_friend_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = target(&body)?;
    let chat_id = blocking(&state, move |db| {
        db.accept_friend_request(&identity.username, &sender)
    })
    .await?;

    Ok(Json(AcceptResponse {
        message: "Friend request accepted and chat created".into(),
        chat_id,
    }))
}

/// POST /delete-request
pub async fn delete_friend_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = target(&body)?;
    blocking(&state, move |db| {
        db.reject_friend_request(&identity.username, &sender)
    })
    .await?;
    Ok(Json(StatusResponse::new("Friend request deleted")))
}
