//! Structured error handling for source acquisition

use thiserror::Error;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to clone {url}: {message}")]
    CloneFailed { url: String, message: String },

    #[error("clone of {url} exceeded its timeout")]
    CloneTimedOut { url: String },

    #[error("commit {sha} does not exist in the cloned working copy")]
    CommitNotFound { sha: String },

    #[error("failed to verify commit {sha}: {message}")]
    VerifyFailed { sha: String, message: String },

    #[error("failed to remove working copy at {path}: {message}")]
    CloseFailed { path: String, message: String },
}
