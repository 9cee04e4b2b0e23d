pub mod auth;
pub mod chats;
pub mod error;
pub mod friends;
pub mod middleware;
pub mod session;

use tracing::error;

use smt_db::{Database, DbError};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use session::SessionGate;

/// Run blocking SQLite work off the async runtime.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
