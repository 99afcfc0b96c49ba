//! RSA key material and the immutable key-set snapshot readers share.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use tracing::warn;

use crate::domain::entities::{SigningKey, SigningKeyKind};
use crate::errors::DomainError;

const RSA_KEY_BITS: usize = 2048;

/// Generate a fresh RSA key pair as `"<public PEM>|<private PEM>"`
pub fn generate_key_material() -> Result<String, DomainError> {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS).map_err(|e| {
        DomainError::Internal {
            message: format!("Failed to generate RSA key: {}", e),
        }
    })?;

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| DomainError::Internal {
            message: format!("Failed to encode private key: {}", e),
        })?;

    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| DomainError::Internal {
            message: format!("Failed to encode public key: {}", e),
        })?;

    Ok(format!("{}|{}", public_pem, private_pem.as_str()))
}

/// A signing key with its parsed jsonwebtoken keys
#[derive(Clone)]
pub struct LoadedSigningKey {
    pub key: SigningKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl LoadedSigningKey {
    pub fn load(key: SigningKey) -> Result<Self, DomainError> {
        let (public_pem, private_pem) = key
            .public_key_pem()
            .zip(key.private_key_pem())
            .ok_or_else(|| DomainError::Internal {
                message: format!("Signing key {} has malformed key material", key.id),
            })?;

        let encoding_key =
            EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| DomainError::Internal {
                message: format!("Invalid private key for {}: {}", key.id, e),
            })?;

        let decoding_key =
            DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| DomainError::Internal {
                message: format!("Invalid public key for {}: {}", key.id, e),
            })?;

        Ok(Self {
            key,
            encoding_key,
            decoding_key,
        })
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn kind(&self) -> SigningKeyKind {
        self.key.kind
    }

    pub fn created_at_time(&self) -> i64 {
        self.key.created_at_time
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for LoadedSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedSigningKey")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Every stored key at one point in time, newest first per kind
#[derive(Debug, Default)]
pub struct KeySnapshot {
    dynamic_keys: Vec<Arc<LoadedSigningKey>>,
    static_keys: Vec<Arc<LoadedSigningKey>>,
    loaded: bool,
}

impl KeySnapshot {
    /// Build a snapshot from stored keys. Keys whose material cannot be
    /// parsed are skipped.
    pub fn from_keys(dynamic_keys: Vec<SigningKey>, static_keys: Vec<SigningKey>) -> Self {
        Self {
            dynamic_keys: load_sorted(dynamic_keys),
            static_keys: load_sorted(static_keys),
            loaded: true,
        }
    }

    /// Whether the snapshot was read from the store at least once
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn keys(&self, kind: SigningKeyKind) -> &[Arc<LoadedSigningKey>] {
        match kind {
            SigningKeyKind::Dynamic => &self.dynamic_keys,
            SigningKeyKind::Static => &self.static_keys,
        }
    }

    pub fn newest(&self, kind: SigningKeyKind) -> Option<&Arc<LoadedSigningKey>> {
        self.keys(kind).first()
    }

    pub fn find(&self, kid: &str) -> Option<&Arc<LoadedSigningKey>> {
        self.dynamic_keys
            .iter()
            .chain(self.static_keys.iter())
            .find(|k| k.id() == kid)
    }

    /// A copy of this snapshot that also holds `key`
    pub fn with_key(&self, key: Arc<LoadedSigningKey>) -> Self {
        let mut dynamic_keys = self.dynamic_keys.clone();
        let mut static_keys = self.static_keys.clone();
        let target = match key.kind() {
            SigningKeyKind::Dynamic => &mut dynamic_keys,
            SigningKeyKind::Static => &mut static_keys,
        };
        target.retain(|k| k.id() != key.id());
        target.push(key);
        target.sort_by(|a, b| b.created_at_time().cmp(&a.created_at_time()));

        Self {
            dynamic_keys,
            static_keys,
            loaded: self.loaded,
        }
    }
}

fn load_sorted(keys: Vec<SigningKey>) -> Vec<Arc<LoadedSigningKey>> {
    let mut loaded: Vec<Arc<LoadedSigningKey>> = keys
        .into_iter()
        .filter_map(|key| {
            let id = key.id.clone();
            match LoadedSigningKey::load(key) {
                Ok(loaded) => Some(Arc::new(loaded)),
                Err(e) => {
                    warn!(kid = %id, error = %e, "Skipping unusable signing key");
                    None
                }
            }
        })
        .collect();
    loaded.sort_by(|a, b| b.created_at_time().cmp(&a.created_at_time()));
    loaded
}
