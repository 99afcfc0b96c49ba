//! MySQL repository implementations

mod session_repository_impl;
mod signing_key_repository_impl;

pub use session_repository_impl::MySqlSessionRepository;
pub use signing_key_repository_impl::MySqlSigningKeyRepository;

use ks_core::errors::DomainError;

/// Wraps a driver error with the operation that failed
pub(crate) fn storage_error(operation: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::Storage {
        message: format!("Failed to {}: {}", operation, e),
    }
}
