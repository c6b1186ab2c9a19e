//! Encrypted per-user access-credential storage and retrieval.
//!
//! Tokens are stored AES-256-GCM-encrypted at rest, keyed by `(user_id,
//! provider)`. Lookup distinguishes "no credential on file" (expected,
//! gracefully degradable) from decryption/I-O failure (unexpected,
//! actionable).

pub mod cipher;
pub mod error;
pub mod mock;
pub mod postgres;
pub mod traits;

pub use error::{CredentialsError, CredentialsResult};
pub use mock::MockCredentialStore;
pub use postgres::PostgresCredentialStore;
pub use traits::CredentialStore;
