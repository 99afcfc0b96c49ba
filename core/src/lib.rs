//! # Keystone Core
//!
//! Session-token core of the Keystone authentication server.
//! This crate contains the token entities, the signing key manager, the
//! access/refresh token codecs, the session lifecycle service, repository
//! interfaces for the session and key stores, and the error types shared by
//! all of them.

pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::*;
pub use errors::*;
pub use repositories::{SessionRepository, SigningKeyRepository};
pub use services::{
    AccessTokenService, AccountLinking, Clock, CreateSessionRequest, NoAccountLinking,
    RefreshTokenService, SessionCleanupConfig, SessionCleanupService, SessionService,
    SigningKeyManager, SystemClock,
};
