//! The credential store capability

use crate::error::CredentialsResult;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the access token for `user_id`'s connection to `provider`.
    ///
    /// Returns `Err(CredentialsError::TokenNotFound)` when the user has no
    /// stored credential — an expected condition callers should degrade
    /// gracefully on, not retry. Any other error is unexpected.
    async fn lookup(&self, user_id: Uuid, provider: &str) -> CredentialsResult<String>;
}
