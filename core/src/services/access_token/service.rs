//! Access token service implementation

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::entities::{
    AccessTokenClaims, AccessTokenFields, AccessTokenVersion, SigningKeyKind, TokenInfo,
};
use crate::errors::{DomainError, DomainResult, TokenError};
use crate::services::clock::Clock;
use crate::services::signing_key::{KeyLookup, LoadedSigningKey, SigningKeyManager};

use super::parsing::{decode_json_segment, split_token, RawToken};
use super::{jwt, legacy};

/// Everything needed to mint an access token
#[derive(Debug, Clone)]
pub struct AccessTokenRequest {
    pub session_handle: String,
    pub user_id: String,
    pub recipe_user_id: Option<String>,
    pub refresh_token_hash1: String,
    pub parent_refresh_token_hash1: Option<String>,
    pub user_payload: Map<String, Value>,
    pub anti_csrf_token: Option<String>,
    pub last_manual_refresh_time: Option<i64>,
    /// Overrides `now + validity`; used to keep the expiry of a regenerated token
    pub explicit_expiry: Option<i64>,
    pub version: AccessTokenVersion,
    pub key_kind: SigningKeyKind,
}

/// Claims of a token whose signature has been checked, with the kind of key that signed it
#[derive(Debug, Clone)]
pub struct VerifiedAccessToken {
    pub claims: AccessTokenClaims,
    pub key_kind: SigningKeyKind,
}

/// Service for encoding and verifying access tokens
pub struct AccessTokenService {
    key_manager: Arc<SigningKeyManager>,
    clock: Arc<dyn Clock>,
    validity_ms: i64,
}

impl AccessTokenService {
    /// Creates a new access token service
    ///
    /// # Arguments
    ///
    /// * `key_manager` - Source of signing and verification keys
    /// * `clock` - Time source
    /// * `validity_ms` - Lifetime of newly minted tokens
    pub fn new(key_manager: Arc<SigningKeyManager>, clock: Arc<dyn Clock>, validity_ms: i64) -> Self {
        Self {
            key_manager,
            clock,
            validity_ms,
        }
    }

    pub fn key_manager(&self) -> &Arc<SigningKeyManager> {
        &self.key_manager
    }

    /// Mints and signs an access token
    ///
    /// V3 tokens carry whole seconds, so the returned expiry is rounded
    /// down to the second for them.
    ///
    /// # Returns
    ///
    /// * `Ok(TokenInfo)` - The signed token
    /// * `Err(DomainError::BadInput)` - The payload uses a reserved claim name
    pub async fn create_new_access_token(&self, request: AccessTokenRequest) -> DomainResult<TokenInfo> {
        if request.version == AccessTokenVersion::V3 {
            if let Some(claim) = jwt::find_protected_claim(&request.user_payload) {
                return Err(DomainError::bad_input(format!(
                    "The user payload contains protected field: {}",
                    claim
                )));
            }
        }

        let now = self.clock.now_millis();
        let mut expiry_time = request.explicit_expiry.unwrap_or(now + self.validity_ms);
        let last_manual_refresh_time = match request.version {
            AccessTokenVersion::V1 => request.last_manual_refresh_time,
            _ => Some(request.last_manual_refresh_time.unwrap_or(now)),
        };
        if request.version == AccessTokenVersion::V3 {
            expiry_time -= expiry_time.rem_euclid(1000);
        }

        let fields = AccessTokenFields {
            session_handle: request.session_handle,
            user_id: request.user_id,
            recipe_user_id: match request.version {
                AccessTokenVersion::V3 => request.recipe_user_id,
                _ => None,
            },
            refresh_token_hash1: request.refresh_token_hash1,
            parent_refresh_token_hash1: request.parent_refresh_token_hash1,
            anti_csrf_token: request.anti_csrf_token,
            user_payload: request.user_payload,
            last_manual_refresh_time,
            time_created: now,
            expiry_time,
        };

        let key = self.key_manager.get_latest_issued_key(request.key_kind).await?;
        let token = match request.version {
            AccessTokenVersion::V1 | AccessTokenVersion::V2 => {
                legacy::encode(request.version, &fields, key.encoding_key())?
            }
            AccessTokenVersion::V3 => jwt::encode_token(&fields, key.id(), key.encoding_key())?,
        };

        Ok(TokenInfo {
            token,
            created_time: now,
            expiry: expiry_time,
        })
    }

    /// Verifies a token and returns its claims
    ///
    /// # Arguments
    ///
    /// * `token` - The access token string
    /// * `check_anti_csrf_presence` - Require the token to embed an anti-CSRF token
    ///
    /// # Returns
    ///
    /// * `Ok(AccessTokenClaims)` - Signature valid, claims complete, not expired
    /// * `Err(DomainError::Token(e))` - `e.is_try_refresh()` tells a soft failure
    ///   (expired, key outside window, missing claims) from a hard one
    pub async fn get_info_from_access_token(
        &self,
        token: &str,
        check_anti_csrf_presence: bool,
    ) -> DomainResult<AccessTokenClaims> {
        let verified = self.verify_signature_allowing_expired(token).await?;
        let fields = verified.claims.fields();

        if fields.is_expired(self.clock.now_millis()) {
            return Err(TokenError::Expired.into());
        }
        if check_anti_csrf_presence && fields.anti_csrf_token.is_none() {
            return Err(TokenError::MissingAntiCsrf.into());
        }

        Ok(verified.claims)
    }

    /// Full signature and structure verification without the expiry check
    pub async fn verify_signature_allowing_expired(&self, token: &str) -> DomainResult<VerifiedAccessToken> {
        let raw = split_token(token)?;

        match raw.version {
            AccessTokenVersion::V3 => self.verify_jwt(token, &raw).await,
            AccessTokenVersion::V1 | AccessTokenVersion::V2 => self.verify_legacy(&raw).await,
        }
    }

    /// Parses a token without checking its signature or expiry
    pub fn get_info_from_access_token_without_verifying(&self, token: &str) -> DomainResult<AccessTokenClaims> {
        let raw = split_token(token)?;
        let payload = decode_json_segment(raw.payload_segment)?;
        Ok(claims_from_payload(&raw, &payload)?)
    }

    pub fn get_access_token_version(&self, claims: &AccessTokenClaims) -> AccessTokenVersion {
        claims.version()
    }

    async fn verify_jwt(&self, token: &str, raw: &RawToken<'_>) -> DomainResult<VerifiedAccessToken> {
        let kid = raw.kid.clone().unwrap_or_default();

        let key = match self.key_manager.get_key_by_id(&kid).await? {
            KeyLookup::Valid(key) => key,
            KeyLookup::OutsideVerificationWindow => {
                return Err(TokenError::KeyOutsideVerificationWindow { kid }.into())
            }
            KeyLookup::Unknown => return Err(TokenError::UnknownKeyId { kid }.into()),
        };

        let claims = jwt::decode_verified(token, key.decoding_key())?;
        Ok(VerifiedAccessToken {
            claims: claims_from_payload(raw, &claims)?,
            key_kind: key.kind(),
        })
    }

    async fn verify_legacy(&self, raw: &RawToken<'_>) -> DomainResult<VerifiedAccessToken> {
        let payload = decode_json_segment(raw.payload_segment)?;

        let mut candidates = self.key_manager.get_verification_candidates().await?;
        let mut signer = find_signer(raw, &candidates.valid);
        if signer.is_none() {
            // Another instance may have rotated since the snapshot was taken
            candidates = self.key_manager.reload_verification_candidates().await?;
            signer = find_signer(raw, &candidates.valid);
        }

        let Some(key) = signer else {
            if let Some(stale) = find_signer(raw, &candidates.stale) {
                debug!(kid = %stale.id(), "Legacy access token signed by an expired key");
                return Err(TokenError::KeyOutsideVerificationWindow {
                    kid: stale.id().to_string(),
                }
                .into());
            }
            return Err(TokenError::InvalidSignature.into());
        };

        Ok(VerifiedAccessToken {
            claims: claims_from_payload(raw, &payload)?,
            key_kind: key.kind(),
        })
    }
}

fn find_signer(raw: &RawToken<'_>, keys: &[Arc<LoadedSigningKey>]) -> Option<Arc<LoadedSigningKey>> {
    keys.iter()
        .find(|key| legacy::verify_signature(raw.signing_input, raw.signature, key.decoding_key()))
        .cloned()
}

fn claims_from_payload(raw: &RawToken<'_>, payload: &Map<String, Value>) -> Result<AccessTokenClaims, TokenError> {
    let fields = match raw.version {
        AccessTokenVersion::V3 => jwt::fields_from_claims(payload)?,
        version => legacy::fields_from_payload(version, payload)?,
    };
    Ok(AccessTokenClaims::new(
        raw.version,
        raw.kid.clone().unwrap_or_default(),
        fields,
    ))
}
