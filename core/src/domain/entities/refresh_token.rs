//! Refresh token payload.

use serde::{Deserialize, Serialize};

/// Refresh token envelope version, appended to the token as `.<version>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshTokenVersion {
    /// AES-256-GCM encrypted JSON payload with parent hash chaining
    V2,
}

impl RefreshTokenVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTokenVersion::V2 => "V2",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "V2" => Some(RefreshTokenVersion::V2),
            _ => None,
        }
    }
}

/// Decrypted contents of a refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenPayload {
    pub session_handle: String,
    pub user_id: String,
    /// `None` only for the first refresh token of a session
    pub parent_refresh_token_hash1: Option<String>,
    pub anti_csrf_token: Option<String>,
    pub format_version: RefreshTokenVersion,
}
