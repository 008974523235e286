//! Error types for Wicket
//!
//! Every core operation returns a tagged result; the HTTP boundary maps the
//! variant to a status code. Token verification failures and refresh reuse
//! stay distinct here so callers and tests can match on them, but all of
//! them surface to the client as a uniform 401.

use hyper::StatusCode;

use crate::auth::tokens::TokenError;

/// Main error type for Wicket operations
#[derive(Debug, thiserror::Error)]
pub enum WicketError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Presented refresh token no longer matches the stored value. The
    /// stored token has been revoked as a defensive measure.
    #[error("refresh token reused: {0}")]
    RefreshReused(String),

    #[error("token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WicketError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RefreshReused(_) => StatusCode::UNAUTHORIZED,
            Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for WicketError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WicketError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for WicketError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for WicketError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for Wicket operations
pub type Result<T> = std::result::Result<T, WicketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_map_to_unauthorized() {
        for err in [
            WicketError::Token(TokenError::Expired),
            WicketError::Token(TokenError::Malformed),
            WicketError::Token(TokenError::BadSignature),
            WicketError::RefreshReused("replayed".into()),
            WicketError::Unauthorized("no token".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn store_failures_are_internal() {
        assert_eq!(
            WicketError::Database("unreachable".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
