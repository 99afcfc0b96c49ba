//! Signing key manager for access tokens
//!
//! Keeps the current dynamic key, the dynamic keys still inside their
//! verification window, and the static keys. Readers work on an immutable
//! [`KeySnapshot`] published through an `ArcSwap`; rotation is serialised by a
//! mutex so exactly one key is generated per rotation boundary.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::entities::{SigningKey, SigningKeyKind};
use crate::errors::{DomainError, DomainResult};
use crate::repositories::SigningKeyRepository;
use crate::services::clock::Clock;

use super::config::SigningKeyConfig;
use super::keys::{generate_key_material, KeySnapshot, LoadedSigningKey};

/// Result of resolving a key id
#[derive(Debug, Clone)]
pub enum KeyLookup {
    Valid(Arc<LoadedSigningKey>),
    /// A dynamic key that is too old to verify tokens, stored or not
    OutsideVerificationWindow,
    Unknown,
}

/// Keys to try when a token does not name its signing key
#[derive(Debug, Clone, Default)]
pub struct VerificationCandidates {
    /// Keys that may verify tokens: dynamic then static, newest first
    pub valid: Vec<Arc<LoadedSigningKey>>,
    /// Stored dynamic keys past their verification window
    pub stale: Vec<Arc<LoadedSigningKey>>,
}

/// Manager for RS256 access token signing keys
pub struct SigningKeyManager {
    repository: Arc<dyn SigningKeyRepository>,
    clock: Arc<dyn Clock>,
    config: SigningKeyConfig,
    snapshot: ArcSwap<KeySnapshot>,
    rotation_lock: Mutex<()>,
}

impl std::fmt::Debug for SigningKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SigningKeyManager {
    /// Creates a manager with an empty snapshot. Keys are read lazily; call
    /// [`initialize`](Self::initialize) to migrate the legacy key and load
    /// eagerly.
    pub fn new(
        repository: Arc<dyn SigningKeyRepository>,
        clock: Arc<dyn Clock>,
        config: SigningKeyConfig,
    ) -> Self {
        Self {
            repository,
            clock,
            config,
            snapshot: ArcSwap::from_pointee(KeySnapshot::default()),
            rotation_lock: Mutex::new(()),
        }
    }

    /// Migrates the legacy key if present, loads all keys and makes sure a
    /// key of the configured issuing kind exists.
    pub async fn initialize(&self) -> DomainResult<()> {
        self.transfer_legacy_key_to_new_table().await?;
        self.reload().await?;
        self.get_latest_issued_key(self.issuing_kind(false)).await?;
        Ok(())
    }

    pub fn config(&self) -> &SigningKeyConfig {
        &self.config
    }

    /// The key kind used to sign a new token
    pub fn issuing_kind(&self, use_static_key: bool) -> SigningKeyKind {
        if use_static_key || !self.config.dynamic_keys_enabled {
            SigningKeyKind::Static
        } else {
            SigningKeyKind::Dynamic
        }
    }

    /// Re-reads every key from the store and publishes a new snapshot
    pub async fn reload(&self) -> DomainResult<Arc<KeySnapshot>> {
        let dynamic_keys = self.repository.get_keys(SigningKeyKind::Dynamic).await?;
        let static_keys = self.repository.get_keys(SigningKeyKind::Static).await?;

        let snapshot = Arc::new(KeySnapshot::from_keys(dynamic_keys, static_keys));
        self.snapshot.store(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Newest key of `kind` that may still sign tokens.
    ///
    /// For dynamic keys a new key is generated once the newest one is older
    /// than the update interval. A static key is generated only if none
    /// exists.
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<LoadedSigningKey>)` - The key to sign with
    /// * `Err(DomainError::Storage)` - The key store failed
    /// * `Err(DomainError::Internal)` - Key generation failed
    pub async fn get_latest_issued_key(
        &self,
        kind: SigningKeyKind,
    ) -> DomainResult<Arc<LoadedSigningKey>> {
        if let Some(key) = self.issuable_key(&self.snapshot.load(), kind) {
            return Ok(key);
        }

        let _guard = self.rotation_lock.lock().await;

        // Another caller or another instance may have rotated meanwhile
        let snapshot = self.reload().await?;
        if let Some(key) = self.issuable_key(&snapshot, kind) {
            return Ok(key);
        }

        let now = self.clock.now_millis();
        let key_material = tokio::task::spawn_blocking(generate_key_material)
            .await
            .map_err(|e| DomainError::Internal {
                message: format!("Key generation task failed: {}", e),
            })??;

        let key = match kind {
            SigningKeyKind::Dynamic => SigningKey::new_dynamic(now, key_material),
            SigningKeyKind::Static => SigningKey::new_static(now, key_material),
        };

        if !self.repository.add_key(&key).await? {
            // Same millisecond as a key written by another instance
            let snapshot = self.reload().await?;
            return self
                .issuable_key(&snapshot, kind)
                .ok_or_else(|| DomainError::Internal {
                    message: format!("Signing key {} collided but is not usable", key.id),
                });
        }

        let loaded = Arc::new(LoadedSigningKey::load(key)?);
        self.snapshot
            .store(Arc::new(snapshot.with_key(Arc::clone(&loaded))));

        info!(kid = %loaded.id(), kind = %kind, "Generated new access token signing key");
        Ok(loaded)
    }

    /// Keys of `kind`, newest first. Dynamic keys are limited to the ones
    /// still inside their verification window.
    pub async fn get_all_keys(
        &self,
        kind: SigningKeyKind,
    ) -> DomainResult<Vec<Arc<LoadedSigningKey>>> {
        let snapshot = self.current_snapshot().await?;
        let now = self.clock.now_millis();

        Ok(snapshot
            .keys(kind)
            .iter()
            .filter(|k| kind == SigningKeyKind::Static || self.is_within_window(k.created_at_time(), now))
            .cloned()
            .collect())
    }

    /// Resolves a key id, re-reading the store once on a miss
    pub async fn get_key_by_id(&self, kid: &str) -> DomainResult<KeyLookup> {
        let now = self.clock.now_millis();

        if let Some(created_at) = SigningKey::created_at_from_dynamic_kid(kid) {
            if !self.is_within_window(created_at, now) {
                return Ok(KeyLookup::OutsideVerificationWindow);
            }
        }

        if let Some(key) = self.current_snapshot().await?.find(kid) {
            return Ok(KeyLookup::Valid(Arc::clone(key)));
        }

        debug!(kid = %kid, "Signing key not in snapshot, reloading");
        match self.reload().await?.find(kid) {
            Some(key) => Ok(KeyLookup::Valid(Arc::clone(key))),
            None => Ok(KeyLookup::Unknown),
        }
    }

    /// Keys to try for tokens that carry no key id
    pub async fn get_verification_candidates(&self) -> DomainResult<VerificationCandidates> {
        let snapshot = self.current_snapshot().await?;
        Ok(self.candidates_from(&snapshot))
    }

    /// Like [`get_verification_candidates`](Self::get_verification_candidates)
    /// but re-reads the store first
    pub async fn reload_verification_candidates(&self) -> DomainResult<VerificationCandidates> {
        let snapshot = self.reload().await?;
        Ok(self.candidates_from(&snapshot))
    }

    /// Moves the key in the legacy single-key slot into the key table.
    ///
    /// The key keeps its creation time. It becomes a dynamic key when dynamic
    /// signing is enabled, otherwise a static key. Safe to call repeatedly.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A key was moved
    /// * `Ok(false)` - Nothing to move, or the key had already been moved
    pub async fn transfer_legacy_key_to_new_table(&self) -> DomainResult<bool> {
        let Some(legacy) = self.repository.get_legacy_key().await? else {
            return Ok(false);
        };

        let kind = self.issuing_kind(false);
        let already_stored = self
            .repository
            .get_keys(kind)
            .await?
            .iter()
            .any(|k| {
                k.created_at_time == legacy.created_at_time && k.key_material == legacy.key_material
            });

        let inserted = if already_stored {
            false
        } else {
            let key = match kind {
                SigningKeyKind::Dynamic => {
                    SigningKey::new_dynamic(legacy.created_at_time, legacy.key_material)
                }
                SigningKeyKind::Static => {
                    SigningKey::new_static(legacy.created_at_time, legacy.key_material)
                }
            };
            self.repository.add_key(&key).await?
        };

        self.repository.remove_legacy_key().await?;
        self.reload().await?;

        if inserted {
            info!(kind = %kind, created_at = legacy.created_at_time, "Migrated legacy signing key");
        } else {
            debug!("Legacy signing key was already migrated");
        }
        Ok(inserted)
    }

    /// Deletes dynamic keys past their verification window
    ///
    /// # Returns
    ///
    /// Number of keys deleted
    pub async fn clean_expired_access_token_signing_keys(&self) -> DomainResult<u64> {
        let cutoff = self.clock.now_millis() - self.config.retention_ms();
        let deleted = self
            .repository
            .remove_keys_created_before(SigningKeyKind::Dynamic, cutoff)
            .await?;

        self.reload().await?;

        if deleted > 0 {
            info!(deleted, "Removed expired access token signing keys");
        }
        Ok(deleted)
    }

    /// When the current dynamic key stops being used for issuing
    pub async fn dynamic_signing_key_expiry_time(&self) -> DomainResult<i64> {
        let key = self.get_latest_issued_key(SigningKeyKind::Dynamic).await?;
        Ok(key.created_at_time() + self.config.update_interval_ms)
    }

    async fn current_snapshot(&self) -> DomainResult<Arc<KeySnapshot>> {
        let snapshot = self.snapshot.load_full();
        if snapshot.is_loaded() {
            Ok(snapshot)
        } else {
            self.reload().await
        }
    }

    fn issuable_key(
        &self,
        snapshot: &KeySnapshot,
        kind: SigningKeyKind,
    ) -> Option<Arc<LoadedSigningKey>> {
        let newest = snapshot.newest(kind)?;
        match kind {
            SigningKeyKind::Static => Some(Arc::clone(newest)),
            SigningKeyKind::Dynamic => {
                let age = self.clock.now_millis() - newest.created_at_time();
                (age < self.config.update_interval_ms).then(|| Arc::clone(newest))
            }
        }
    }

    fn is_within_window(&self, created_at: i64, now: i64) -> bool {
        created_at + self.config.retention_ms() > now
    }

    fn candidates_from(&self, snapshot: &KeySnapshot) -> VerificationCandidates {
        let now = self.clock.now_millis();
        let (valid_dynamic, stale): (Vec<_>, Vec<_>) = snapshot
            .keys(SigningKeyKind::Dynamic)
            .iter()
            .cloned()
            .partition(|k| self.is_within_window(k.created_at_time(), now));

        let mut valid = valid_dynamic;
        valid.extend(snapshot.keys(SigningKeyKind::Static).iter().cloned());

        VerificationCandidates { valid, stale }
    }
}
