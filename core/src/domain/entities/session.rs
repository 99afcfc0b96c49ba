//! Session entities.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::access_token::TokenInfo;

/// A persisted session.
///
/// `handle`, `user_id`, `recipe_user_id` and `time_created` never change after
/// creation. All times are milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub handle: String,
    pub user_id: String,
    pub recipe_user_id: String,
    /// `hash(hash(token))` of the refresh token that may currently be used
    pub current_refresh_token_hash2: String,
    /// Hash2s of earlier refresh tokens of this session, newest first
    #[serde(default)]
    pub superseded_refresh_token_hash2s: Vec<String>,
    pub session_data: Value,
    pub jwt_payload: Value,
    pub grant_payload: Option<Value>,
    pub anti_csrf_token: Option<String>,
    pub time_created: i64,
    pub expiry: i64,
}

impl SessionRow {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry <= now_ms
    }

    /// Whether `hash2` belongs to a refresh token this session has already rotated away from
    pub fn is_superseded(&self, hash2: &str) -> bool {
        self.superseded_refresh_token_hash2s
            .iter()
            .any(|h| h == hash2)
    }

    /// Advances the refresh token chain.
    ///
    /// Returns `false` and leaves the row untouched when the current hash no
    /// longer matches `rotation.expected_hash2`.
    pub fn apply_rotation(&mut self, rotation: &RefreshTokenRotation) -> bool {
        if self.current_refresh_token_hash2 != rotation.expected_hash2 {
            return false;
        }

        let previous = std::mem::replace(
            &mut self.current_refresh_token_hash2,
            rotation.new_hash2.clone(),
        );
        self.superseded_refresh_token_hash2s.insert(0, previous);
        self.superseded_refresh_token_hash2s
            .truncate(rotation.chain_depth.max(1));
        self.expiry = rotation.new_expiry;
        if rotation.new_anti_csrf_token.is_some() {
            self.anti_csrf_token = rotation.new_anti_csrf_token.clone();
        }
        true
    }

    /// Applies the non-`None` fields of `update`
    pub fn apply_update(&mut self, update: &SessionPayloadUpdate) {
        if let Some(session_data) = &update.session_data {
            self.session_data = session_data.clone();
        }
        if let Some(jwt_payload) = &update.jwt_payload {
            self.jwt_payload = jwt_payload.clone();
        }
        if let Some(grant_payload) = &update.grant_payload {
            self.grant_payload = Some(grant_payload.clone());
        }
        if let Some(anti_csrf_token) = &update.anti_csrf_token {
            self.anti_csrf_token = Some(anti_csrf_token.clone());
        }
    }
}

/// Compare-and-swap request for a refresh token rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRotation {
    /// The hash2 the caller presented; the swap only happens if it is still current
    pub expected_hash2: String,
    pub new_hash2: String,
    pub new_expiry: i64,
    pub new_anti_csrf_token: Option<String>,
    /// Maximum length of the superseded chain after the swap
    pub chain_depth: usize,
}

/// In-place payload changes; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPayloadUpdate {
    pub session_data: Option<Value>,
    pub jwt_payload: Option<Value>,
    pub grant_payload: Option<Value>,
    pub anti_csrf_token: Option<String>,
}

impl SessionPayloadUpdate {
    pub fn is_empty(&self) -> bool {
        self.session_data.is_none()
            && self.jwt_payload.is_none()
            && self.grant_payload.is_none()
            && self.anti_csrf_token.is_none()
    }
}

/// Read-only view of a session row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_handle: String,
    pub user_id: String,
    pub recipe_user_id: String,
    pub session_data: Value,
    pub jwt_payload: Value,
    pub grant_payload: Option<Value>,
    pub expiry: i64,
    pub time_created: i64,
}

impl From<SessionRow> for SessionInfo {
    fn from(row: SessionRow) -> Self {
        Self {
            session_handle: row.handle,
            user_id: row.user_id,
            recipe_user_id: row.recipe_user_id,
            session_data: row.session_data,
            jwt_payload: row.jwt_payload,
            grant_payload: row.grant_payload,
            expiry: row.expiry,
            time_created: row.time_created,
        }
    }
}

/// Identity of the session a token belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub handle: String,
    pub user_id: String,
    pub recipe_user_id: String,
    /// The payload embedded in the access token
    pub user_data_in_jwt: Value,
    /// Access token expiry in milliseconds
    pub expiry_time: i64,
}

/// Result of a lifecycle operation.
///
/// Token fields are `None` when the operation did not mint that token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInformationHolder {
    pub session: SessionSummary,
    pub access_token: Option<TokenInfo>,
    pub refresh_token: Option<TokenInfo>,
    pub anti_csrf_token: Option<String>,
}
