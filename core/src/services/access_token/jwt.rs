//! V3 access tokens: RS256 JWTs with a `kid` header.
//!
//! Caller claims are merged at the top level next to the session claims.
//! `exp` and `iat` are in seconds on the wire and milliseconds everywhere else.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{json, Map, Value};

use crate::domain::entities::AccessTokenFields;
use crate::errors::TokenError;

use super::parsing::{optional_i64, optional_str, required_i64, required_str};

/// Claim names the session layer owns
pub const PROTECTED_CLAIMS: &[&str] = &[
    "sub",
    "rsub",
    "sessionHandle",
    "refreshTokenHash1",
    "parentRefreshTokenHash1",
    "antiCsrfToken",
    "exp",
    "iat",
    "lmrt",
];

/// First caller claim that collides with a session claim
pub fn find_protected_claim(payload: &Map<String, Value>) -> Option<&'static str> {
    PROTECTED_CLAIMS
        .iter()
        .copied()
        .find(|claim| payload.contains_key(*claim))
}

pub(crate) fn encode_token(
    fields: &AccessTokenFields,
    kid: &str,
    key: &EncodingKey,
) -> Result<String, TokenError> {
    let mut claims = fields.user_payload.clone();
    claims.insert("sub".into(), json!(fields.user_id));
    if let Some(recipe_user_id) = &fields.recipe_user_id {
        claims.insert("rsub".into(), json!(recipe_user_id));
    }
    claims.insert("sessionHandle".into(), json!(fields.session_handle));
    claims.insert("refreshTokenHash1".into(), json!(fields.refresh_token_hash1));
    claims.insert(
        "parentRefreshTokenHash1".into(),
        json!(fields.parent_refresh_token_hash1),
    );
    claims.insert("antiCsrfToken".into(), json!(fields.anti_csrf_token));
    claims.insert("exp".into(), json!(fields.expiry_time / 1000));
    claims.insert("iat".into(), json!(fields.time_created / 1000));
    claims.insert("lmrt".into(), json!(fields.last_manual_refresh_time));

    let mut header = Header::new(Algorithm::RS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(kid.to_string());

    encode(&header, &Value::Object(claims), key).map_err(|e| TokenError::GenerationFailed {
        reason: e.to_string(),
    })
}

/// Verifies the signature and returns the raw claims. Expiry is not checked.
pub(crate) fn decode_verified(
    token: &str,
    key: &DecodingKey,
) -> Result<Map<String, Value>, TokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Map<String, Value>>(token, key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::malformed(e.to_string()),
        }
    })?;
    Ok(data.claims)
}

pub(crate) fn fields_from_claims(claims: &Map<String, Value>) -> Result<AccessTokenFields, TokenError> {
    let user_payload = claims
        .iter()
        .filter(|(name, _)| !PROTECTED_CLAIMS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Ok(AccessTokenFields {
        session_handle: required_str(claims, "sessionHandle")?,
        user_id: required_str(claims, "sub")?,
        recipe_user_id: optional_str(claims, "rsub")?,
        refresh_token_hash1: required_str(claims, "refreshTokenHash1")?,
        parent_refresh_token_hash1: optional_str(claims, "parentRefreshTokenHash1")?,
        anti_csrf_token: optional_str(claims, "antiCsrfToken")?,
        user_payload,
        last_manual_refresh_time: optional_i64(claims, "lmrt")?,
        time_created: required_i64(claims, "iat")? * 1000,
        expiry_time: required_i64(claims, "exp")? * 1000,
    })
}
