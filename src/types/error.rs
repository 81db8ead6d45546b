//! Error types for relay-chain
//!
//! [`Rejection`] covers refusals the caller caused (unknown or stale digest,
//! bad post, spent reaction digest); they leave no state behind and map to
//! 400. The remaining [`RelayError`] variants are lookups, conflicts and
//! infrastructure failures, each with its own HTTP status.

use axum::http::StatusCode;

use crate::authorizer::{ReactionRejection, WriteRejection};

/// Main error type for relay-chain operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A business-rule refusal surfaced to the caller.
///
/// None of these leave any state behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("invalid post: {0}")]
    InvalidPost(String),

    #[error("tag 0 is reserved for the genesis post")]
    ReservedTag,

    #[error(transparent)]
    Write(#[from] WriteRejection),

    #[error(transparent)]
    Reaction(#[from] ReactionRejection),

    #[error("invalid reaction descriptor provided")]
    InvalidDescriptor,

    #[error("no more anonymous reactions can be made")]
    AnonymousCapReached,
}

impl RelayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for expected refusals, false for infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_) | Self::NotFound(_) | Self::Conflict(_) | Self::Rejected(_)
        )
    }

    /// The rejection, if this error is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<WriteRejection> for RelayError {
    fn from(err: WriteRejection) -> Self {
        Self::Rejected(Rejection::Write(err))
    }
}

impl From<ReactionRejection> for RelayError {
    fn from(err: ReactionRejection) -> Self {
        Self::Rejected(Rejection::Reaction(err))
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!(error = %err, "Constraint violation");
                Self::Conflict("write conflicts with existing data".to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for relay-chain operations
pub type Result<T> = std::result::Result<T, RelayError>;
