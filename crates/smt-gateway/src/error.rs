use thiserror::Error;

use smt_db::DbError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Admission without a resolved identity. The upgrade must be refused.
    #[error("connection has no authenticated identity")]
    Unauthenticated,

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("blocking task failed: {0}")]
    Join(String),
}

/// Failure to hand a frame to one connection. Never surfaced beyond the
/// registry: the connection is dropped instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("outbound queue full")]
    QueueFull,

    #[error("connection closed")]
    Closed,

    #[error("write timed out")]
    Timeout,
}
