use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upstream registry error: {0}")]
    Upstream(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token lookup collision")]
    TokenLookupCollision,
}

impl Error {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    /// HTTP status the error maps to at the API edge.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidTokenFormat => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Upstream(_) | Error::Publish(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Integrity(_)
            | Error::Database(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::TokenLookupCollision => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Internal faults whose detail must stay in the logs.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::Config(_)
                | Error::TokenLookupCollision
        )
    }

    /// Maps a unique-constraint violation to `Conflict`, leaving other errors untouched.
    pub(crate) fn on_conflict(self, message: impl Into<String>) -> Self {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Conflict(message.into())
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
