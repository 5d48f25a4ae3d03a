//! Error types for vigil-detect
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for vigil-detect
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors surfaced by vigil-common
    #[error(transparent)]
    Common(#[from] vigil_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame source open/read failures
    #[error("Capture error: {0}")]
    Capture(String),

    /// Frame could not be turned into classifier input
    #[error("Preprocess error: {0}")]
    Preprocess(String),

    /// Classifier unreachable or returned an unusable score
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Notification transport failures
    #[error("Notification error: {0}")]
    Notification(String),

    /// Media store (clips, snapshots, uploads) failures
    #[error("Media error: {0}")]
    Media(String),

    /// Request payload failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not possible in the current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status used when this error reaches a handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Common(vigil_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Common(vigil_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenience Result type using vigil-detect Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            Error::Classifier("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
