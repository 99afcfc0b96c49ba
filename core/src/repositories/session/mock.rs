//! Mock implementation of SessionRepository for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entities::{RefreshTokenRotation, SessionPayloadUpdate, SessionRow};
use crate::errors::DomainError;

use super::r#trait::SessionRepository;

/// Mock session repository for testing
#[derive(Clone)]
pub struct MockSessionRepository {
    sessions: Arc<RwLock<HashMap<String, SessionRow>>>,
}

impl MockSessionRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored rows, expired ones included
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Overwrite a row directly
    pub async fn put(&self, session: SessionRow) {
        self.sessions
            .write()
            .await
            .insert(session.handle.clone(), session);
    }
}

impl Default for MockSessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn create_session(&self, session: SessionRow) -> Result<(), DomainError> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&session.handle) {
            return Err(DomainError::Storage {
                message: format!("Session {} already exists", session.handle),
            });
        }

        sessions.insert(session.handle.clone(), session);
        Ok(())
    }

    async fn get_session(&self, handle: &str) -> Result<Option<SessionRow>, DomainError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(handle).cloned())
    }

    async fn compare_and_swap_refresh_token(
        &self,
        handle: &str,
        rotation: &RefreshTokenRotation,
    ) -> Result<bool, DomainError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(handle)
            .map(|row| row.apply_rotation(rotation))
            .unwrap_or(false))
    }

    async fn update_session_payloads(
        &self,
        handle: &str,
        update: &SessionPayloadUpdate,
    ) -> Result<bool, DomainError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(handle) {
            Some(row) => {
                row.apply_update(update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_sessions(&self, handles: &[String]) -> Result<Vec<String>, DomainError> {
        let mut sessions = self.sessions.write().await;
        Ok(handles
            .iter()
            .filter(|handle| sessions.remove(handle.as_str()).is_some())
            .cloned()
            .collect())
    }

    async fn get_session_handles_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, DomainError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.handle.clone())
            .collect())
    }

    async fn get_non_expired_session_handles_for_user(
        &self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<Vec<String>, DomainError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|row| row.user_id == user_id && !row.is_expired(now_ms))
            .map(|row| row.handle.clone())
            .collect())
    }

    async fn delete_expired_sessions(&self, now_ms: i64) -> Result<u64, DomainError> {
        let mut sessions = self.sessions.write().await;
        let initial_count = sessions.len();

        sessions.retain(|_, row| !row.is_expired(now_ms));

        Ok((initial_count - sessions.len()) as u64)
    }
}
