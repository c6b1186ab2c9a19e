//! Structured error handling for the credential store
//!
//! `TokenNotFound` is an expected, non-actionable condition (the user simply
//! never connected a provider); every other variant is unexpected and
//! actionable.

use thiserror::Error;

pub type CredentialsResult<T> = std::result::Result<T, CredentialsError>;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no stored credential for user {user_id}, provider '{provider}'")]
    TokenNotFound { user_id: uuid::Uuid, provider: String },

    #[error("failed to look up credential for user {user_id}, provider '{provider}': {message}")]
    LookupFailed {
        user_id: uuid::Uuid,
        provider: String,
        message: String,
    },

    #[error("failed to decrypt stored token for user {user_id}, provider '{provider}': {message}")]
    DecryptionFailed {
        user_id: uuid::Uuid,
        provider: String,
        message: String,
    },

    #[error("encryption key configuration is invalid: {message}")]
    InvalidKey { message: String },
}
