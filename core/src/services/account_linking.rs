//! Account linking collaborator.
//!
//! Bulk session operations can optionally cover every user account linked
//! to the given one. Resolving those links is owned by another component.

use async_trait::async_trait;

use crate::errors::DomainResult;

/// Resolves the set of user ids linked to a user
#[async_trait]
pub trait AccountLinking: Send + Sync {
    /// All user ids linked to `user_id`, including `user_id` itself
    async fn linked_user_ids(&self, user_id: &str) -> DomainResult<Vec<String>>;
}

/// Every user is only linked to itself
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccountLinking;

#[async_trait]
impl AccountLinking for NoAccountLinking {
    async fn linked_user_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        Ok(vec![user_id.to_string()])
    }
}
