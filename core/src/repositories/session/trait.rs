//! Session repository trait defining the interface for session row persistence.

use async_trait::async_trait;

use crate::domain::entities::{RefreshTokenRotation, SessionPayloadUpdate, SessionRow};
use crate::errors::DomainError;

/// Repository trait for SessionRow persistence operations
///
/// Rows are keyed by session handle. Implementations must make
/// `compare_and_swap_refresh_token` atomic per row: two callers presenting the
/// same expected hash may not both succeed.
///
/// Expiry is decided by the caller; read methods return expired rows as-is
/// unless the method takes a `now_ms` argument.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session row
    ///
    /// # Returns
    /// * `Err(DomainError::Storage)` - a row with the same handle already exists
    async fn create_session(&self, session: SessionRow) -> Result<(), DomainError>;

    /// Find a session row by handle
    async fn get_session(&self, handle: &str) -> Result<Option<SessionRow>, DomainError>;

    /// Atomically rotate the refresh token of a session
    ///
    /// # Arguments
    /// * `handle` - Session handle
    /// * `rotation` - Expected current hash2 and the values to install
    ///
    /// # Returns
    /// * `Ok(true)` - The row was updated
    /// * `Ok(false)` - The row is gone or its current hash2 no longer matches
    async fn compare_and_swap_refresh_token(
        &self,
        handle: &str,
        rotation: &RefreshTokenRotation,
    ) -> Result<bool, DomainError>;

    /// Update payload fields in place without touching expiry or the refresh chain
    ///
    /// # Returns
    /// * `Ok(false)` - No row with this handle
    async fn update_session_payloads(
        &self,
        handle: &str,
        update: &SessionPayloadUpdate,
    ) -> Result<bool, DomainError>;

    /// Delete the given sessions
    ///
    /// # Returns
    /// The handles that existed and were deleted
    async fn delete_sessions(&self, handles: &[String]) -> Result<Vec<String>, DomainError>;

    /// Handles of every session of `user_id`, expired ones included
    async fn get_session_handles_for_user(&self, user_id: &str)
        -> Result<Vec<String>, DomainError>;

    /// Handles of the sessions of `user_id` that expire after `now_ms`
    async fn get_non_expired_session_handles_for_user(
        &self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<Vec<String>, DomainError>;

    /// Delete every row whose expiry is at or before `now_ms`
    ///
    /// # Returns
    /// Number of rows deleted
    async fn delete_expired_sessions(&self, now_ms: i64) -> Result<u64, DomainError>;
}
