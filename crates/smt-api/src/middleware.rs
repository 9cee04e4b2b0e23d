use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// Resolve the caller's session and hand the typed identity to the handler
/// through request extensions. Requests without one never reach the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state.sessions.resolve(req.headers())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
