//! Session and token error types
//!
//! `TokenError` is raised by the token codecs. The session lifecycle never
//! surfaces it directly: every codec failure is classified into a
//! `SessionError` so callers only deal with "refresh and retry",
//! "unauthorised" and "token theft".

use thiserror::Error;

/// Outcome classes a session caller has to handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The access token can no longer be used but the session may still be
    /// alive. The client should call refresh.
    #[error("Try refresh token: {reason}")]
    TryRefreshToken { reason: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// A superseded refresh token was replayed. The session has been revoked.
    #[error("Token theft detected for session {session_handle}")]
    TokenTheftDetected {
        session_handle: String,
        user_id: String,
    },
}

/// Access and refresh token codec failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Access token expired")]
    Expired,

    #[error("Signing key {kid} is outside its verification window")]
    KeyOutsideVerificationWindow { kid: String },

    #[error("Access token does not contain all the information. Maybe the structure has changed?")]
    MissingClaim { claim: String },

    #[error("Access token does not contain the anti-csrf token")]
    MissingAntiCsrf,

    #[error("Malformed token: {reason}")]
    Malformed { reason: String },

    #[error("Unknown signing key: {kid}")]
    UnknownKeyId { kid: String },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Unsupported access token version: {version}")]
    UnsupportedVersion { version: String },

    #[error("Failed to decrypt refresh token: {reason}")]
    RefreshTokenDecryption { reason: String },

    #[error("Token generation failed: {reason}")]
    GenerationFailed { reason: String },
}

impl TokenError {
    /// Soft failures: the session may still be valid and a refresh can
    /// produce a usable access token.
    pub fn is_try_refresh(&self) -> bool {
        matches!(
            self,
            TokenError::Expired
                | TokenError::KeyOutsideVerificationWindow { .. }
                | TokenError::MissingClaim { .. }
                | TokenError::MissingAntiCsrf
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        TokenError::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<TokenError> for SessionError {
    fn from(error: TokenError) -> Self {
        if error.is_try_refresh() {
            SessionError::TryRefreshToken {
                reason: error.to_string(),
            }
        } else {
            SessionError::Unauthorized {
                reason: error.to_string(),
            }
        }
    }
}
