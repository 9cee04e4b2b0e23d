use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info};

use smt_db::Database;
use smt_types::api::{CredentialsRequest, SessionResponse, StatusResponse};

use crate::blocking;
use crate::error::ApiError;
use crate::session::SessionGate;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: SessionGate,
}

/// POST /signup
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let password_hash = hash_password(req.password).await?;

    let name = username.clone();
    let user_id = blocking(&state, move |db| db.create_user(&name, &password_hash)).await?;

    let token = state.sessions.issue(user_id, &username)?;
    let jar = jar.add(state.sessions.session_cookie(token.clone()));
    info!("Registered {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse {
            user_id,
            username,
            token,
        }),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "username and password are required".into(),
        ));
    }

    let user = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let stored_hash = user.password.clone();
    let verified = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash).map_err(|e| {
            error!("Stored password hash is unreadable: {}", e);
            ApiError::Internal
        })?;
        Ok::<_, ApiError>(
            Argon2::default()
                .verify_password(req.password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    if !verified {
        return Err(ApiError::Unauthorized);
    }

    let token = state.sessions.issue(user.id, &user.username)?;
    let jar = jar.add(state.sessions.session_cookie(token.clone()));
    info!("{} logged in", user.username);

    Ok((
        jar,
        Json(SessionResponse {
            user_id: user.id,
            username: user.username,
            token,
        }),
    ))
}

/// POST /logout — tokens are stateless, so this only drops the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(state.sessions.clear_cookie()),
        Json(StatusResponse::new("Logged out")),
    )
}

/// Argon2id PHC string for `password`, computed on the blocking pool.
async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })?
    .map_err(|e| {
        error!("Password hashing failed: {}", e);
        ApiError::Internal
    })
}
