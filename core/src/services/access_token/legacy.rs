//! V1 and V2 access tokens.
//!
//! `base64(header).base64(payload).signature` with the caller payload nested
//! under `userData`. The header carries a `version` instead of a key id, so
//! verification has to try every candidate key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use serde_json::{json, Map, Value};

use crate::domain::entities::{AccessTokenFields, AccessTokenVersion};
use crate::errors::TokenError;

use super::parsing::{
    optional_i64, optional_str, required_i64, required_object, required_str,
};

pub(crate) fn encode(
    version: AccessTokenVersion,
    fields: &AccessTokenFields,
    key: &EncodingKey,
) -> Result<String, TokenError> {
    let header = json!({
        "alg": "RS256",
        "typ": "JWT",
        "version": version.as_str(),
    });

    let mut payload = Map::new();
    payload.insert("sessionHandle".into(), json!(fields.session_handle));
    payload.insert("userId".into(), json!(fields.user_id));
    payload.insert("refreshTokenHash1".into(), json!(fields.refresh_token_hash1));
    if version == AccessTokenVersion::V2 {
        payload.insert(
            "parentRefreshTokenHash1".into(),
            json!(fields.parent_refresh_token_hash1),
        );
    }
    payload.insert("userData".into(), Value::Object(fields.user_payload.clone()));
    if let Some(anti_csrf_token) = &fields.anti_csrf_token {
        payload.insert("antiCsrfToken".into(), json!(anti_csrf_token));
    }
    payload.insert("expiryTime".into(), json!(fields.expiry_time));
    payload.insert("timeCreated".into(), json!(fields.time_created));
    if let Some(lmrt) = fields.last_manual_refresh_time {
        payload.insert("lmrt".into(), json!(lmrt));
    }

    let signing_input = format!(
        "{}.{}",
        STANDARD.encode(header.to_string()),
        STANDARD.encode(Value::Object(payload).to_string())
    );
    let signature = crypto::sign(signing_input.as_bytes(), key, Algorithm::RS256).map_err(|e| {
        TokenError::GenerationFailed {
            reason: e.to_string(),
        }
    })?;

    Ok(format!("{}.{}", signing_input, signature))
}

/// `false` when the signature does not match this key
pub(crate) fn verify_signature(signing_input: &str, signature: &str, key: &DecodingKey) -> bool {
    crypto::verify(signature, signing_input.as_bytes(), key, Algorithm::RS256).unwrap_or(false)
}

pub(crate) fn fields_from_payload(
    version: AccessTokenVersion,
    payload: &Map<String, Value>,
) -> Result<AccessTokenFields, TokenError> {
    let last_manual_refresh_time = match version {
        AccessTokenVersion::V2 => Some(required_i64(payload, "lmrt")?),
        _ => optional_i64(payload, "lmrt")?,
    };
    let parent_refresh_token_hash1 = match version {
        AccessTokenVersion::V2 => optional_str(payload, "parentRefreshTokenHash1")?,
        _ => None,
    };

    Ok(AccessTokenFields {
        session_handle: required_str(payload, "sessionHandle")?,
        user_id: required_str(payload, "userId")?,
        recipe_user_id: None,
        refresh_token_hash1: required_str(payload, "refreshTokenHash1")?,
        parent_refresh_token_hash1,
        anti_csrf_token: optional_str(payload, "antiCsrfToken")?,
        user_payload: required_object(payload, "userData")?,
        last_manual_refresh_time,
        time_created: required_i64(payload, "timeCreated")?,
        expiry_time: required_i64(payload, "expiryTime")?,
    })
}
