use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Either side of a relation could not be resolved, or both sides are the same user.
    #[error("user cannot be resolved or refers to the requester")]
    SelfOrMissingUser,

    #[error("not a member of chat {0}")]
    NotMember(i64),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}
