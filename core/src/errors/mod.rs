//! Domain-specific error types and error handling.

mod types;


// Re-export all error types
pub use types::{SessionError, TokenError};

use thiserror::Error;

/// Core domain errors (general purpose)
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Bad input: {message}")]
    BadInput { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Bridge to specific error types
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl DomainError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        DomainError::BadInput {
            message: message.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        DomainError::Session(SessionError::Unauthorized {
            reason: reason.into(),
        })
    }

    pub fn try_refresh(reason: impl Into<String>) -> Self {
        DomainError::Session(SessionError::TryRefreshToken {
            reason: reason.into(),
        })
    }

    /// The session-level view of this error, if it has one
    pub fn as_session_error(&self) -> Option<&SessionError> {
        match self {
            DomainError::Session(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DomainError::Session(SessionError::Unauthorized { .. }))
    }

    pub fn is_try_refresh(&self) -> bool {
        matches!(
            self,
            DomainError::Session(SessionError::TryRefreshToken { .. })
        )
    }

    pub fn is_token_theft(&self) -> bool {
        matches!(
            self,
            DomainError::Session(SessionError::TokenTheftDetected { .. })
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
