//! Shared token splitting, header detection and claim extraction.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{Map, Value};

use crate::domain::entities::AccessTokenVersion;
use crate::errors::TokenError;

/// A token split into its parts with the header decoded
#[derive(Debug)]
pub(crate) struct RawToken<'a> {
    pub version: AccessTokenVersion,
    pub kid: Option<String>,
    /// `header.payload`, the signed message
    pub signing_input: &'a str,
    pub payload_segment: &'a str,
    pub signature: &'a str,
}

pub(crate) fn split_token(token: &str) -> Result<RawToken<'_>, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::malformed("expected three dot-separated segments"));
    };

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(TokenError::malformed("empty token segment"));
    }

    let header_json = decode_json_segment(header)?;
    let (version, kid) = detect_version(&header_json)?;

    Ok(RawToken {
        version,
        kid,
        signing_input: &token[..header.len() + 1 + payload.len()],
        payload_segment: payload,
        signature,
    })
}

fn detect_version(header: &Map<String, Value>) -> Result<(AccessTokenVersion, Option<String>), TokenError> {
    if header.get("alg").and_then(Value::as_str) != Some("RS256") {
        return Err(TokenError::malformed("unsupported signing algorithm"));
    }

    if let Some(kid) = header.get("kid").and_then(Value::as_str) {
        return Ok((AccessTokenVersion::V3, Some(kid.to_string())));
    }

    match header.get("version").and_then(Value::as_str) {
        Some("1") => Ok((AccessTokenVersion::V1, None)),
        Some("2") => Ok((AccessTokenVersion::V2, None)),
        Some(other) => Err(TokenError::UnsupportedVersion {
            version: other.to_string(),
        }),
        None => Err(TokenError::malformed("header carries neither kid nor version")),
    }
}

/// Decodes a base64 (standard or url-safe) JSON object segment
pub(crate) fn decode_json_segment(segment: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(segment))
        .map_err(|e| TokenError::malformed(format!("invalid base64: {}", e)))?;

    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::malformed("segment is not a JSON object")),
        Err(e) => Err(TokenError::malformed(format!("invalid JSON: {}", e))),
    }
}

fn missing(claim: &str) -> TokenError {
    TokenError::MissingClaim {
        claim: claim.to_string(),
    }
}

pub(crate) fn required_str(claims: &Map<String, Value>, name: &str) -> Result<String, TokenError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(name))
}

/// Absent and `null` are both `None`; any other non-string is a missing claim
pub(crate) fn optional_str(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<Option<String>, TokenError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(missing(name)),
    }
}

pub(crate) fn required_i64(claims: &Map<String, Value>, name: &str) -> Result<i64, TokenError> {
    claims
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| missing(name))
}

pub(crate) fn optional_i64(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<Option<i64>, TokenError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| missing(name)),
    }
}

pub(crate) fn required_object(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<Map<String, Value>, TokenError> {
    claims
        .get(name)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| missing(name))
}
