//! `PostgreSQL`-backed `CredentialStore`: reads an AES-256-GCM-encrypted
//! token from the `oauth_accounts` table and decrypts it with a
//! process-wide key.

use crate::cipher::{self};
use crate::error::{CredentialsError, CredentialsResult};
use crate::traits::CredentialStore;
use aes_gcm::Aes256Gcm;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresCredentialStore {
    pool: PgPool,
    cipher: Aes256Gcm,
}

impl PostgresCredentialStore {
    /// # Errors
    /// Returns `CredentialsError::InvalidKey` if `key_env_var` is unset, not
    /// valid hex, or does not decode to 32 bytes.
    pub fn new(pool: PgPool, key_env_var: &str) -> CredentialsResult<Self> {
        Ok(Self {
            pool,
            cipher: cipher::load_key(key_env_var)?,
        })
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn lookup(&self, user_id: Uuid, provider: &str) -> CredentialsResult<String> {
        let row = sqlx::query(
            r"
            SELECT encrypted_token, nonce
            FROM oauth_accounts
            WHERE user_id = $1 AND provider = $2
            ",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredentialsError::LookupFailed {
            user_id,
            provider: provider.to_string(),
            message: e.to_string(),
        })?;

        let Some(row) = row else {
            return Err(CredentialsError::TokenNotFound {
                user_id,
                provider: provider.to_string(),
            });
        };

        let encrypted_token: Vec<u8> =
            row.try_get("encrypted_token")
                .map_err(|e| CredentialsError::LookupFailed {
                    user_id,
                    provider: provider.to_string(),
                    message: e.to_string(),
                })?;
        let nonce: Vec<u8> = row.try_get("nonce").map_err(|e| CredentialsError::LookupFailed {
            user_id,
            provider: provider.to_string(),
            message: e.to_string(),
        })?;

        cipher::decrypt(&self.cipher, &encrypted_token, &nonce, user_id, provider)
    }
}
