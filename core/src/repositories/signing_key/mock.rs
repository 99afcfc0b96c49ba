//! Mock implementation of SigningKeyRepository for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entities::{LegacySigningKey, SigningKey, SigningKeyKind};
use crate::errors::DomainError;

use super::r#trait::SigningKeyRepository;

#[derive(Default)]
struct State {
    keys: Vec<SigningKey>,
    legacy: Option<LegacySigningKey>,
    refresh_token_key: Option<String>,
}

/// Mock signing key repository for testing
#[derive(Clone, Default)]
pub struct MockSigningKeyRepository {
    state: Arc<RwLock<State>>,
    inserts: Arc<AtomicUsize>,
}

impl MockSigningKeyRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository whose legacy slot holds `key`
    pub async fn with_legacy_key(key: LegacySigningKey) -> Self {
        let repo = Self::new();
        repo.state.write().await.legacy = Some(key);
        repo
    }

    /// Number of successful `add_key` calls
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub async fn all_keys(&self) -> Vec<SigningKey> {
        self.state.read().await.keys.clone()
    }

    pub async fn has_legacy_key(&self) -> bool {
        self.state.read().await.legacy.is_some()
    }
}

#[async_trait]
impl SigningKeyRepository for MockSigningKeyRepository {
    async fn get_keys(&self, kind: SigningKeyKind) -> Result<Vec<SigningKey>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .iter()
            .filter(|k| k.kind == kind)
            .cloned()
            .collect())
    }

    async fn add_key(&self, key: &SigningKey) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;

        if state.keys.iter().any(|k| k.id == key.id) {
            return Ok(false);
        }

        state.keys.push(key.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn remove_keys_created_before(
        &self,
        kind: SigningKeyKind,
        created_before_ms: i64,
    ) -> Result<u64, DomainError> {
        let mut state = self.state.write().await;
        let initial_count = state.keys.len();

        state
            .keys
            .retain(|k| k.kind != kind || k.created_at_time >= created_before_ms);

        Ok((initial_count - state.keys.len()) as u64)
    }

    async fn get_legacy_key(&self) -> Result<Option<LegacySigningKey>, DomainError> {
        Ok(self.state.read().await.legacy.clone())
    }

    async fn remove_legacy_key(&self) -> Result<(), DomainError> {
        self.state.write().await.legacy = None;
        Ok(())
    }

    async fn get_or_create_refresh_token_key(
        &self,
        candidate: &str,
    ) -> Result<String, DomainError> {
        let mut state = self.state.write().await;
        Ok(state
            .refresh_token_key
            .get_or_insert_with(|| candidate.to_string())
            .clone())
    }
}
