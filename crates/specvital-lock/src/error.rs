//! Structured error handling for the distributed lock

use thiserror::Error;

pub type LockResult<T> = std::result::Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to acquire advisory lock {key}: {message}")]
    AcquireFailed { key: i64, message: String },

    #[error("failed to release advisory lock {key}: {message}")]
    ReleaseFailed { key: i64, message: String },

    #[error("failed to check out a connection for advisory lock {key}: {source}")]
    PoolError {
        key: i64,
        #[source]
        source: sqlx::Error,
    },
}
