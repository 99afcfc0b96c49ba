//! Refresh token service implementation

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::entities::{RefreshTokenPayload, RefreshTokenVersion, TokenInfo};
use crate::errors::{DomainError, DomainResult, SessionError, TokenError};
use crate::repositories::SigningKeyRepository;
use crate::services::clock::Clock;

use super::config::RefreshTokenConfig;

const IV_LENGTH: usize = 12;
const AES_KEY_LENGTH: usize = 32;
const TOKEN_KEY_ITERATIONS: u32 = 100;
const MASTER_KEY_ITERATIONS: u32 = 1000;
const MASTER_KEY_RANDOM_BYTES: usize = 64;

/// SHA-256 hex digest of a string
pub fn hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedPayload {
    session_handle: String,
    user_id: String,
    parent_refresh_token_hash1: Option<String>,
    anti_csrf_token: Option<String>,
    /// Makes every issued token unique
    nonce: String,
}

/// Service for minting and opening refresh tokens
pub struct RefreshTokenService {
    key_repository: Arc<dyn SigningKeyRepository>,
    clock: Arc<dyn Clock>,
    config: RefreshTokenConfig,
    master_key: OnceCell<String>,
}

impl RefreshTokenService {
    pub fn new(
        key_repository: Arc<dyn SigningKeyRepository>,
        clock: Arc<dyn Clock>,
        config: RefreshTokenConfig,
    ) -> Self {
        Self {
            key_repository,
            clock,
            config,
            master_key: OnceCell::new(),
        }
    }

    /// Generates a new master key in `iterations:saltHex:keyHex` form
    pub fn generate_new_key() -> String {
        let mut password = [0u8; MASTER_KEY_RANDOM_BYTES];
        let mut salt = [0u8; MASTER_KEY_RANDOM_BYTES];
        OsRng.fill_bytes(&mut password);
        OsRng.fill_bytes(&mut salt);

        let mut key = [0u8; AES_KEY_LENGTH];
        pbkdf2::pbkdf2_hmac::<Sha512>(&password, &salt, MASTER_KEY_ITERATIONS, &mut key);

        format!(
            "{}:{}:{}",
            MASTER_KEY_ITERATIONS,
            hex::encode(salt),
            hex::encode(key)
        )
    }

    /// SHA-256 hex digest of the raw token string
    pub fn hash(token: &str) -> String {
        hash(token)
    }

    /// Creates an encrypted refresh token
    ///
    /// # Arguments
    ///
    /// * `session_handle` - Session the token belongs to
    /// * `user_id` - Owner of the session
    /// * `parent_refresh_token_hash1` - Hash of the token this one replaces, `None` for the first
    /// * `anti_csrf_token` - Anti-CSRF token to bind to this refresh token
    ///
    /// # Returns
    ///
    /// * `Ok(TokenInfo)` - Token expiring after the refresh token validity
    /// * `Err(DomainError)` - Key lookup or encryption failed
    pub async fn create_new_refresh_token(
        &self,
        session_handle: &str,
        user_id: &str,
        parent_refresh_token_hash1: Option<String>,
        anti_csrf_token: Option<String>,
    ) -> DomainResult<TokenInfo> {
        let sealed = SealedPayload {
            session_handle: session_handle.to_string(),
            user_id: user_id.to_string(),
            parent_refresh_token_hash1,
            anti_csrf_token,
            nonce: hash(&Uuid::new_v4().to_string()),
        };
        let plaintext = serde_json::to_vec(&sealed).map_err(|e| DomainError::Internal {
            message: format!("Failed to serialize refresh token: {}", e),
        })?;

        let master_key = self.master_key().await?;
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = cipher_for(master_key, &iv)
            .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
            .map_err(|e| DomainError::Internal {
                message: format!("Encryption failed: {}", e),
            })?;

        let mut envelope = Vec::with_capacity(IV_LENGTH + ciphertext.len());
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(&ciphertext);

        let now = self.clock.now_millis();
        Ok(TokenInfo {
            token: format!("{}.{}", BASE64.encode(envelope), RefreshTokenVersion::V2.as_str()),
            created_time: now,
            expiry: now + self.config.validity_ms,
        })
    }

    /// Decrypts a refresh token
    ///
    /// # Returns
    ///
    /// * `Ok(RefreshTokenPayload)` - Token decrypted
    /// * `Err(DomainError::Session(Unauthorized))` - Token malformed, tampered
    ///   with, or encrypted under another key
    pub async fn get_info_from_refresh_token(&self, token: &str) -> DomainResult<RefreshTokenPayload> {
        let master_key = self.master_key().await?;
        open(master_key, token).map_err(|e| SessionError::from(e).into())
    }

    async fn master_key(&self) -> DomainResult<&str> {
        let key = self
            .master_key
            .get_or_try_init(|| async {
                match &self.config.key {
                    Some(key) => Ok(key.clone()),
                    None => {
                        self.key_repository
                            .get_or_create_refresh_token_key(&Self::generate_new_key())
                            .await
                    }
                }
            })
            .await?;
        Ok(key.as_str())
    }
}

fn cipher_for(master_key: &str, iv: &[u8]) -> Aes256Gcm {
    let mut key = [0u8; AES_KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha512>(master_key.as_bytes(), iv, TOKEN_KEY_ITERATIONS, &mut key);
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key))
}

fn open(master_key: &str, token: &str) -> Result<RefreshTokenPayload, TokenError> {
    let decryption_error = |reason: String| TokenError::RefreshTokenDecryption { reason };

    let (body, suffix) = token
        .rsplit_once('.')
        .ok_or_else(|| decryption_error("missing version suffix".to_string()))?;
    let format_version = RefreshTokenVersion::from_suffix(suffix)
        .ok_or_else(|| decryption_error(format!("unknown version {}", suffix)))?;

    let envelope = BASE64
        .decode(body)
        .map_err(|e| decryption_error(format!("invalid base64: {}", e)))?;
    if envelope.len() <= IV_LENGTH {
        return Err(decryption_error("token too short".to_string()));
    }
    let (iv, ciphertext) = envelope.split_at(IV_LENGTH);

    let plaintext = cipher_for(master_key, iv)
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|e| decryption_error(e.to_string()))?;

    let sealed: SealedPayload = serde_json::from_slice(&plaintext)
        .map_err(|e| decryption_error(format!("invalid payload: {}", e)))?;

    Ok(RefreshTokenPayload {
        session_handle: sealed.session_handle,
        user_id: sealed.user_id,
        parent_refresh_token_hash1: sealed.parent_refresh_token_hash1,
        anti_csrf_token: sealed.anti_csrf_token,
        format_version,
    })
}
