//! Access token entities.
//!
//! Three wire versions exist. They share one field set; the version tag
//! decides how the fields are laid out on the wire and how the signing key
//! is located during verification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Access token wire version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessTokenVersion {
    /// Custom signed format, no kid
    V1,
    /// As V1, plus the parent refresh token hash and a mandatory lmrt
    V2,
    /// RS256 JWT carrying a kid
    V3,
}

impl AccessTokenVersion {
    pub const LATEST: AccessTokenVersion = AccessTokenVersion::V3;

    /// Header `version` value
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTokenVersion::V1 => "1",
            AccessTokenVersion::V2 => "2",
            AccessTokenVersion::V3 => "3",
        }
    }
}

impl Default for AccessTokenVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl std::fmt::Display for AccessTokenVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.as_str())
    }
}

impl std::str::FromStr for AccessTokenVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches(['v', 'V']) {
            "1" => Ok(AccessTokenVersion::V1),
            "2" => Ok(AccessTokenVersion::V2),
            "3" => Ok(AccessTokenVersion::V3),
            _ => Err(format!("Invalid access token version: {}", s)),
        }
    }
}

/// Field set common to every access token version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenFields {
    pub session_handle: String,
    pub user_id: String,
    /// Only carried by V3 tokens
    pub recipe_user_id: Option<String>,
    /// Hash of the refresh token that was current when this token was minted
    pub refresh_token_hash1: String,
    pub parent_refresh_token_hash1: Option<String>,
    pub anti_csrf_token: Option<String>,
    /// Caller-supplied claims
    pub user_payload: Map<String, Value>,
    /// Last manual refresh time in milliseconds
    pub last_manual_refresh_time: Option<i64>,
    /// Milliseconds since the epoch
    pub time_created: i64,
    /// Milliseconds since the epoch
    pub expiry_time: i64,
}

impl AccessTokenFields {
    /// The recipe user id, falling back to the user id for formats that do not carry one
    pub fn effective_recipe_user_id(&self) -> &str {
        self.recipe_user_id.as_deref().unwrap_or(&self.user_id)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_time <= now_ms
    }
}

/// Parsed access token claims, tagged by wire version
#[derive(Debug, Clone, PartialEq)]
pub enum AccessTokenClaims {
    V1(AccessTokenFields),
    V2(AccessTokenFields),
    V3 { kid: String, fields: AccessTokenFields },
}

impl AccessTokenClaims {
    pub fn new(version: AccessTokenVersion, kid: String, fields: AccessTokenFields) -> Self {
        match version {
            AccessTokenVersion::V1 => AccessTokenClaims::V1(fields),
            AccessTokenVersion::V2 => AccessTokenClaims::V2(fields),
            AccessTokenVersion::V3 => AccessTokenClaims::V3 { kid, fields },
        }
    }

    pub fn version(&self) -> AccessTokenVersion {
        match self {
            AccessTokenClaims::V1(_) => AccessTokenVersion::V1,
            AccessTokenClaims::V2(_) => AccessTokenVersion::V2,
            AccessTokenClaims::V3 { .. } => AccessTokenVersion::V3,
        }
    }

    pub fn fields(&self) -> &AccessTokenFields {
        match self {
            AccessTokenClaims::V1(fields) | AccessTokenClaims::V2(fields) => fields,
            AccessTokenClaims::V3 { fields, .. } => fields,
        }
    }

    pub fn into_fields(self) -> AccessTokenFields {
        match self {
            AccessTokenClaims::V1(fields) | AccessTokenClaims::V2(fields) => fields,
            AccessTokenClaims::V3 { fields, .. } => fields,
        }
    }

    /// Key id, only present on V3 tokens
    pub fn kid(&self) -> Option<&str> {
        match self {
            AccessTokenClaims::V3 { kid, .. } => Some(kid),
            _ => None,
        }
    }
}

/// A minted token string with its timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token: String,
    /// Milliseconds since the epoch
    pub created_time: i64,
    /// Milliseconds since the epoch
    pub expiry: i64,
}
