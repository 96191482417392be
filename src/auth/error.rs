use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::repo::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("resource not found")]
    NotFound,

    #[error("invalid ID")]
    InvalidId,

    #[error("incorrect password provided")]
    InvalidCredentials,

    #[error("reset token is unknown, used or expired")]
    InvalidToken,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("secure random source unavailable: {0}")]
    EntropySource(#[source] rand::Error),

    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),

    #[error("reset delivery failed: {0}")]
    Delivery(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AuthError::NotFound,
            other => AuthError::Persistence(other),
        }
    }
}

impl AuthError {
    /// Lookup misses and password mismatches are normal traffic, not faults.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            AuthError::NotFound
                | AuthError::InvalidCredentials
                | AuthError::InvalidId
                | AuthError::InvalidToken
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotFound | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidId | AuthError::InvalidToken => StatusCode::BAD_REQUEST,
            AuthError::Persistence(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AuthError::Hashing(_)
            | AuthError::EntropySource(_)
            | AuthError::Persistence(_)
            | AuthError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
