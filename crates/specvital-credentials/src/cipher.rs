//! AES-256-GCM authenticated encryption for tokens at rest

use crate::error::{CredentialsError, CredentialsResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use uuid::Uuid;

/// Load a hex-encoded 32-byte AES-256 key from the environment variable
/// named by `key_env_var` (e.g. `CredentialsConfig.key_env_var`).
pub fn load_key(key_env_var: &str) -> CredentialsResult<Aes256Gcm> {
    let hex_key = std::env::var(key_env_var).map_err(|_| CredentialsError::InvalidKey {
        message: format!("environment variable '{key_env_var}' is not set"),
    })?;

    let bytes = hex::decode(&hex_key).map_err(|e| CredentialsError::InvalidKey {
        message: format!("'{key_env_var}' is not valid hex: {e}"),
    })?;

    if bytes.len() != 32 {
        return Err(CredentialsError::InvalidKey {
            message: format!(
                "'{key_env_var}' must decode to 32 bytes, got {}",
                bytes.len()
            ),
        });
    }

    let key = Key::<Aes256Gcm>::from_slice(&bytes);
    Ok(Aes256Gcm::new(key))
}

/// Decrypt a stored token. `nonce` must be the 12-byte nonce generated at
/// encryption time.
pub fn decrypt(
    cipher: &Aes256Gcm,
    ciphertext: &[u8],
    nonce: &[u8],
    user_id: Uuid,
    provider: &str,
) -> CredentialsResult<String> {
    let nonce = Nonce::from_slice(nonce);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CredentialsError::DecryptionFailed {
            user_id,
            provider: provider.to_string(),
            message: e.to_string(),
        })?;

    String::from_utf8(plaintext).map_err(|e| CredentialsError::DecryptionFailed {
        user_id,
        provider: provider.to_string(),
        message: format!("decrypted token was not valid UTF-8: {e}"),
    })
}

/// Encrypt a token for storage, returning `(ciphertext, nonce)`.
///
/// # Errors
/// Returns `CredentialsError::InvalidKey` if the cipher fails to seal the
/// plaintext, which should not happen for well-formed input.
pub fn encrypt(
    cipher: &Aes256Gcm,
    nonce_bytes: &[u8; 12],
    token: &str,
) -> CredentialsResult<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .encrypt(nonce, token.as_bytes())
        .map_err(|e| CredentialsError::InvalidKey {
            message: format!("failed to encrypt token: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::OsRng;
    use aes_gcm::AeadCore;

    #[test]
    fn test_encrypt_then_decrypt_roundtrips() {
        let key_hex = "00".repeat(32);
        std::env::set_var("TEST_CRED_KEY", &key_hex);
        let cipher = load_key("TEST_CRED_KEY").unwrap();

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes.copy_from_slice(nonce.as_slice());

        let ciphertext = encrypt(&cipher, &nonce_bytes, "gho_supersecret").unwrap();
        let plaintext = decrypt(
            &cipher,
            &ciphertext,
            &nonce_bytes,
            Uuid::nil(),
            "github",
        )
        .unwrap();

        assert_eq!(plaintext, "gho_supersecret");
        std::env::remove_var("TEST_CRED_KEY");
    }

    #[test]
    fn test_load_key_rejects_wrong_length() {
        std::env::set_var("TEST_CRED_KEY_SHORT", "00112233");
        let result = load_key("TEST_CRED_KEY_SHORT");
        assert!(result.is_err());
        std::env::remove_var("TEST_CRED_KEY_SHORT");
    }
}
