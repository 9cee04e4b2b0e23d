pub mod config;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, Request, State, WebSocketUpgrade},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, get_service, post},
};
use serde::Deserialize;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::Span;

use smt_api::auth::{self, AppState, AppStateInner};
use smt_api::middleware::require_auth;
use smt_api::{ApiError, SessionGate, chats, friends};
use smt_db::Database;
use smt_gateway::{Gateway, connection};

use crate::config::ServerConfig;

/// Largest websocket frame accepted from a client.
const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct ServerState {
    pub app: AppState,
    pub gateway: Gateway,
}

impl ServerState {
    pub fn new(db: Arc<Database>, config: &ServerConfig) -> Self {
        let sessions = SessionGate::new(config.session_secret.clone(), config.session_ttl_secs);
        let gateway = Gateway::new(db.clone(), config.gateway());
        Self {
            app: Arc::new(AppStateInner { db, sessions }),
            gateway,
        }
    }
}

pub fn build_router(state: ServerState, static_dir: &Path) -> Router {
    let public_routes = Router::new()
        .route(
            "/",
            get_service(ServeFile::new(static_dir.join("login.html"))),
        )
        .route(
            "/signup",
            get_service(ServeFile::new(static_dir.join("signup.html"))).post(auth::register),
        )
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .with_state(state.app.clone());

    let protected_routes = Router::new()
        .route(
            "/chat",
            get_service(ServeFile::new(static_dir.join("index.html"))),
        )
        .route("/frrequest", post(friends::send_friend_request))
        .route("/friend-requests", get(friends::list_friend_requests))
        .route("/accept-request", post(friends::accept_friend_request))
        .route("/delete-request", post(friends::delete_friend_request))
        .route("/friends-with-chats", get(chats::friends_with_chats))
        .route("/chat-messages", get(chats::chat_messages))
        .route("/create-group-chat", post(chats::create_group_chat))
        .layer(middleware::from_fn_with_state(state.app.clone(), require_auth))
        .with_state(state.app.clone());

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Request spans record the path only; the query string may carry a session
/// token.
fn request_span(req: &Request) -> Span {
    tracing::debug_span!("request", method = %req.method(), path = %req.uri().path())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Identity is resolved before the upgrade; without one the handshake is
/// answered with 401 and no connection is admitted. The `Authorization`
/// header and the session cookie are tried first. `?token=` is a fallback for
/// clients that can set neither.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let identity = match (state.app.sessions.resolve(&headers), query.token) {
        (Ok(identity), _) => identity,
        (Err(_), Some(token)) => state.app.sessions.verify(&token)?,
        (Err(e), None) => return Err(e),
    };

    Ok(ws
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| connection::handle_connection(socket, state.gateway, identity)))
}
