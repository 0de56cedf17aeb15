use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(i64),

    /// `replyTo` names a message that does not exist at write time.
    #[error("reply target {0} does not exist")]
    MissingReplyTarget(i64),

    /// Any I/O or backing-store fault. Nothing was written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unavailable(format!("corrupt row: {}", err))
    }
}
