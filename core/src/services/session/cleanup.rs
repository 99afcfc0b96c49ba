//! Periodic sweep of expired session rows and signing keys
//!
//! Expired rows are already rejected on every read; the sweep only keeps the
//! stores from growing.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::DomainError;
use crate::repositories::SessionRepository;
use crate::services::clock::Clock;
use crate::services::signing_key::SigningKeyManager;

/// Configuration for the session cleanup service
#[derive(Debug, Clone)]
pub struct SessionCleanupConfig {
    /// How often to run cleanup (in seconds)
    pub interval_seconds: u64,
    /// Whether to enable automatic cleanup
    pub enabled: bool,
}

impl Default for SessionCleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600, // Run every hour
            enabled: true,
        }
    }
}

impl SessionCleanupConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval_seconds: std::env::var("SESSION_CLEANUP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.interval_seconds),
            enabled: std::env::var("SESSION_CLEANUP_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
        }
    }
}

/// Service deleting expired sessions and expired dynamic signing keys
pub struct SessionCleanupService {
    repository: Arc<dyn SessionRepository>,
    key_manager: Arc<SigningKeyManager>,
    clock: Arc<dyn Clock>,
    config: SessionCleanupConfig,
}

impl SessionCleanupService {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        key_manager: Arc<SigningKeyManager>,
        clock: Arc<dyn Clock>,
        config: SessionCleanupConfig,
    ) -> Self {
        Self {
            repository,
            key_manager,
            clock,
            config,
        }
    }

    /// Run a single cleanup cycle
    ///
    /// A failing step is recorded in the result and does not stop the other.
    pub async fn run_cleanup(&self) -> Result<CleanupResult, DomainError> {
        if !self.config.enabled {
            return Ok(CleanupResult::default());
        }

        let mut result = CleanupResult::default();

        match self.cleanup_expired_sessions().await {
            Ok(count) => result.expired_sessions_deleted = count,
            Err(e) => {
                error!(error = %e, "Failed to delete expired sessions");
                result.errors.push(format!("Session cleanup error: {}", e));
            }
        }

        match self.key_manager.clean_expired_access_token_signing_keys().await {
            Ok(count) => result.expired_signing_keys_deleted = count,
            Err(e) => {
                error!(error = %e, "Failed to delete expired signing keys");
                result.errors.push(format!("Signing key cleanup error: {}", e));
            }
        }

        info!(
            sessions = result.expired_sessions_deleted,
            signing_keys = result.expired_signing_keys_deleted,
            "Session cleanup completed"
        );

        Ok(result)
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, DomainError> {
        self.repository
            .delete_expired_sessions(self.clock.now_millis())
            .await
    }

    /// Start the cleanup service as a background task
    ///
    /// Returns `None` when cleanup is disabled.
    pub fn start_background_task(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            warn!("Session cleanup service is disabled");
            return None;
        }

        let interval = std::time::Duration::from_secs(self.config.interval_seconds.max(1));

        Some(tokio::spawn(async move {
            info!(
                interval_seconds = self.config.interval_seconds,
                "Session cleanup service started"
            );

            let mut interval_timer = tokio::time::interval(interval);

            loop {
                interval_timer.tick().await;

                match self.run_cleanup().await {
                    Ok(result) if !result.is_success() => {
                        warn!(errors = ?result.errors, "Cleanup completed with errors");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Session cleanup cycle failed"),
                }
            }
        }))
    }
}

/// Result of a cleanup cycle
#[derive(Debug, Default)]
pub struct CleanupResult {
    pub expired_sessions_deleted: u64,
    pub expired_signing_keys_deleted: u64,
    pub errors: Vec<String>,
}

impl CleanupResult {
    /// Check if the cleanup was successful (no errors)
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn total_cleaned(&self) -> u64 {
        self.expired_sessions_deleted + self.expired_signing_keys_deleted
    }
}
