//! Signing key repository trait for access token keys and the refresh token key.

use async_trait::async_trait;

use crate::domain::entities::{LegacySigningKey, SigningKey, SigningKeyKind};
use crate::errors::DomainError;

/// Repository trait for signing key persistence
///
/// Holds the multi-key table used for access token signing, the legacy
/// single-key slot it replaced, and the refresh token encryption key.
#[async_trait]
pub trait SigningKeyRepository: Send + Sync {
    /// All stored keys of `kind`, in any order
    async fn get_keys(&self, kind: SigningKeyKind) -> Result<Vec<SigningKey>, DomainError>;

    /// Insert a key
    ///
    /// # Returns
    /// * `Ok(true)` - Inserted
    /// * `Ok(false)` - A key with the same id already exists; nothing was written
    async fn add_key(&self, key: &SigningKey) -> Result<bool, DomainError>;

    /// Delete keys of `kind` created strictly before `created_before_ms`
    ///
    /// # Returns
    /// Number of keys deleted
    async fn remove_keys_created_before(
        &self,
        kind: SigningKeyKind,
        created_before_ms: i64,
    ) -> Result<u64, DomainError>;

    /// The key stored in the legacy single-key slot, if any
    async fn get_legacy_key(&self) -> Result<Option<LegacySigningKey>, DomainError>;

    /// Clear the legacy single-key slot
    async fn remove_legacy_key(&self) -> Result<(), DomainError>;

    /// Store `candidate` as the refresh token key unless one exists
    ///
    /// # Returns
    /// The stored key, which is `candidate` only if no key existed before
    async fn get_or_create_refresh_token_key(&self, candidate: &str)
        -> Result<String, DomainError>;
}
