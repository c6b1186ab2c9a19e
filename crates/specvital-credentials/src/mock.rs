//! In-memory `CredentialStore` for unit testing callers of this crate

use crate::error::{CredentialsError, CredentialsResult};
use crate::traits::CredentialStore;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MockCredentialStore {
    tokens: HashMap<(Uuid, String), String>,
    fail_lookup_for: Option<(Uuid, String)>,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, user_id: Uuid, provider: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert((user_id, provider.into()), token.into());
        self
    }

    #[must_use]
    pub fn failing_lookup_for(mut self, user_id: Uuid, provider: impl Into<String>) -> Self {
        self.fail_lookup_for = Some((user_id, provider.into()));
        self
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn lookup(&self, user_id: Uuid, provider: &str) -> CredentialsResult<String> {
        if self.fail_lookup_for.as_ref() == Some(&(user_id, provider.to_string())) {
            return Err(CredentialsError::LookupFailed {
                user_id,
                provider: provider.to_string(),
                message: "mock configured to fail this lookup".to_string(),
            });
        }

        self.tokens
            .get(&(user_id, provider.to_string()))
            .cloned()
            .ok_or(CredentialsError::TokenNotFound {
                user_id,
                provider: provider.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_returns_stored_token() {
        let user_id = Uuid::new_v4();
        let store = MockCredentialStore::new().with_token(user_id, "github", "gho_abc");
        assert_eq!(store.lookup(user_id, "github").await.unwrap(), "gho_abc");
    }

    #[tokio::test]
    async fn test_lookup_missing_token_is_not_found() {
        let store = MockCredentialStore::new();
        let result = store.lookup(Uuid::new_v4(), "github").await;
        assert!(matches!(result, Err(CredentialsError::TokenNotFound { .. })));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_distinguished_from_not_found() {
        let user_id = Uuid::new_v4();
        let store = MockCredentialStore::new().failing_lookup_for(user_id, "github");
        let result = store.lookup(user_id, "github").await;
        assert!(matches!(result, Err(CredentialsError::LookupFailed { .. })));
    }
}
