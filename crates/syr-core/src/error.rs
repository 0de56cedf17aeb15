use syr_db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username, password and service are required")]
    MissingFields,

    /// Covers both unknown user and wrong password.
    #[error("invalid username, password or service")]
    InvalidCredentials,

    #[error("credential store unavailable")]
    Unavailable(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFields => "missing_fields",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("fromUser, fromService and toService are required")]
    MissingFields,

    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// A known id used where it is not allowed, e.g. a private message to the broadcast target.
    #[error("'{0}' is not a valid private target")]
    InvalidTarget(String),

    #[error("reply target {0} does not exist")]
    MissingReplyTarget(i64),

    #[error("message could not be persisted")]
    PersistenceFailed(#[source] StoreError),
}

impl RouteError {
    /// Stable machine-readable code for gateway replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFields => "missing_fields",
            Self::UnknownService(_) => "unknown_service",
            Self::InvalidTarget(_) => "invalid_target",
            Self::MissingReplyTarget(_) => "missing_reply_target",
            Self::PersistenceFailed(_) => "unavailable",
        }
    }
}

impl From<StoreError> for RouteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingReplyTarget(id) => Self::MissingReplyTarget(id),
            other => Self::PersistenceFailed(other),
        }
    }
}
