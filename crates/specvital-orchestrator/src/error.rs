//! Structured error handling for the analyze orchestrator
//!
//! Mirrors the error taxonomy in §7: each variant is tagged permanent or
//! transient so the job dispatcher can decide whether to retry.

use thiserror::Error;
use uuid::Uuid;

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `owner`/`repo` failed validation (length, charset, or an SSRF-guarded character).
    #[error("invalid analyze request: {message}")]
    InvalidInput { message: String },

    #[error("failed to clone {owner}/{repo}: {source}")]
    CloneFailed {
        owner: String,
        repo: String,
        #[source]
        source: specvital_source::SourceError,
    },

    #[error("failed to create analysis record for {owner}/{repo}: {source}")]
    RecordCreationFailed {
        owner: String,
        repo: String,
        #[source]
        source: specvital_inventory::InventoryError,
    },

    #[error("scan failed for analysis {analysis_id}: {source}")]
    ScanFailed {
        analysis_id: Uuid,
        #[source]
        source: specvital_parser::ParserError,
    },

    /// A completed analysis already exists for this `(codebase, commit)`.
    /// Permanent: the orchestrator cancels the job rather than retrying.
    #[error("analysis already completed for this commit (analysis_id={analysis_id})")]
    AlreadyCompleted { analysis_id: Uuid },

    #[error("failed to save inventory for analysis {analysis_id}: {source}")]
    SaveFailed {
        analysis_id: Uuid,
        #[source]
        source: specvital_inventory::InventoryError,
    },

    /// Unexpected credential-store failure (decryption, I/O, key mismatch).
    /// `TokenNotFound` is not represented here — the orchestrator treats it
    /// as an expected condition and falls back to an unauthenticated clone.
    #[error("credential lookup failed for user {user_id}: {source}")]
    TokenLookupFailed {
        user_id: Uuid,
        #[source]
        source: specvital_credentials::CredentialsError,
    },

    /// The per-job deadline elapsed while waiting on the clone semaphore or
    /// any downstream call. Classification is left to the dispatcher.
    #[error("analyze job exceeded its {0:?} timeout")]
    DeadlineExceeded(std::time::Duration),
}

impl OrchestratorError {
    /// True for errors the caller should treat as permanent (cancel, not retry).
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::AlreadyCompleted { .. })
    }
}
