pub mod api;
pub mod events;
pub mod models;

/// Chat scope of the global "All Chat" stream. Every other scope is a positive chat id.
pub const GLOBAL_SCOPE: i64 = 0;

/// Display name used for the global scope.
pub const GLOBAL_SCOPE_NAME: &str = "All Chat";

/// Replay bound used when a caller does not ask for one.
pub const DEFAULT_REPLAY_LIMIT: u32 = 50;
