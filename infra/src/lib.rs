//! # Infrastructure Layer
//!
//! MySQL implementations of the session and signing key stores used by
//! `ks_core`, plus the wiring that turns environment configuration into a
//! ready [`SessionService`].
//!
//! ## Features
//!
//! - `mysql`: Enable MySQL database support (default)

use std::sync::Arc;

use ks_core::errors::DomainError;
use ks_core::services::{Clock, SessionCleanupService, SessionService, SystemClock};

// Re-export core types for convenience
pub use ks_core::errors::*;

/// Database module - MySQL implementations using SQLx
#[cfg(feature = "mysql")]
pub mod database;

/// Configuration module for infrastructure services
pub mod config {
    //! Configuration loaded by [`load_config`](super::load_config)

    use ks_core::services::SessionCleanupConfig;
    use ks_shared::{DatabaseConfig, LoggingConfig, SessionConfig};

    /// Everything needed to stand up the session stores and services
    #[derive(Debug, Clone, Default)]
    pub struct InfrastructureConfig {
        pub database: DatabaseConfig,
        pub session: SessionConfig,
        pub logging: LoggingConfig,
        pub cleanup: SessionCleanupConfig,
    }
}

/// Ready-to-use session services backed by MySQL
#[cfg(feature = "mysql")]
#[derive(Clone)]
pub struct InfrastructureServices {
    pub pool: database::DatabasePool,
    pub sessions: Arc<SessionService>,
    pub cleanup: Arc<SessionCleanupService>,
}

/// Load configuration from the environment and initialize all services
///
/// This function sets up:
/// - The global tracing subscriber, unless one is installed
/// - Database connection pool and schema
/// - Session and signing key stores
/// - The session service with its signing keys loaded
#[cfg(feature = "mysql")]
pub async fn initialize() -> Result<InfrastructureServices, InfrastructureError> {
    let config = load_config()?;
    initialize_with(config).await
}

/// Initialize all services from an explicit configuration
#[cfg(feature = "mysql")]
pub async fn initialize_with(
    config: config::InfrastructureConfig,
) -> Result<InfrastructureServices, InfrastructureError> {
    use database::{DatabasePool, MySqlSessionRepository, MySqlSigningKeyRepository};

    // An embedding process may have installed its own subscriber already
    if let Err(e) = ks_shared::init_tracing(&config.logging) {
        tracing::debug!(error = %e, "Keeping existing tracing subscriber");
    }
    tracing::info!("Initializing infrastructure services");

    let pool = DatabasePool::new(config.database.clone()).await?;
    pool.run_migrations().await?;

    let session_repository = Arc::new(MySqlSessionRepository::new(pool.get_pool().clone()));
    let key_repository = Arc::new(MySqlSigningKeyRepository::new(pool.get_pool().clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sessions = SessionService::build(
        session_repository.clone(),
        key_repository,
        Arc::clone(&clock),
        &config.session,
    )?;
    sessions.initialize().await?;

    let cleanup = Arc::new(SessionCleanupService::new(
        session_repository,
        Arc::clone(sessions.key_manager()),
        clock,
        config.cleanup.clone(),
    ));

    tracing::info!("Infrastructure services initialized successfully");

    Ok(InfrastructureServices {
        pool,
        sessions: Arc::new(sessions),
        cleanup,
    })
}

/// Load infrastructure configuration from environment
///
/// The dotenv file of the current [`Environment`](ks_shared::Environment) is
/// read first, then `.env`; variables already set win over both.
pub fn load_config() -> Result<config::InfrastructureConfig, InfrastructureError> {
    let environment = ks_shared::Environment::from_env();
    dotenvy::from_filename(environment.env_file()).ok();
    dotenvy::dotenv().ok();

    let session = ks_shared::SessionConfig::from_env();
    session
        .validate()
        .map_err(|e| InfrastructureError::Config(e.to_string()))?;

    Ok(config::InfrastructureConfig {
        database: ks_shared::DatabaseConfig::from_env(),
        session,
        logging: ks_shared::LoggingConfig::from_env(),
        cleanup: ks_core::services::SessionCleanupConfig::from_env(),
    })
}

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Database connection error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema setup error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Failure reported by the session core while starting up
    #[error(transparent)]
    Domain(#[from] DomainError),
}
