//! Inventory persistence trait for dependency injection and testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::InventoryResult;
use crate::models::{CreateAnalysisParams, RefreshCandidate};
use specvital_parser::models::Inventory;

/// Transactional save of analysis records and their hierarchical test
/// inventory (files → suites → tests).
///
/// Each operation is its own atomic transaction; there is no notion of a
/// cross-method transaction (§4.6/§9: a crash between `create_analysis_record`
/// and `save_analysis_inventory` leaves a tombstoned `running` row, which is
/// an accepted trade-off).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Upsert the codebase and insert a `running` analysis record.
    ///
    /// # Errors
    /// Returns `InventoryError::UnexpectedState` if `analysis_id` is
    /// `Some(Uuid::nil())`, or any query failure from the underlying pool.
    async fn create_analysis_record(&self, params: CreateAnalysisParams) -> InventoryResult<Uuid>;

    /// Persist the full file/suite/test tree and transition the analysis to
    /// `completed`.
    ///
    /// # Errors
    /// Returns `InventoryError::AlreadyCompleted` if a completed analysis
    /// already exists for this codebase/commit (the unique partial index),
    /// `InventoryError::AnalysisNotFound` if `analysis_id` does not exist,
    /// or any other query/copy failure.
    async fn save_analysis_inventory(
        &self,
        analysis_id: Uuid,
        committed_at: Option<DateTime<Utc>>,
        inventory: &Inventory,
        user_id: Option<Uuid>,
    ) -> InventoryResult<()>;

    /// Mark the analysis as `failed`, truncating `message` to
    /// [`crate::models::ERROR_MESSAGE_MAX_BYTES`] bytes.
    ///
    /// # Errors
    /// Returns `InventoryError::AnalysisNotFound` if `analysis_id` does not
    /// exist, or a query failure. Per §9's open question, callers should
    /// treat this as best-effort: a failure here must not mask the error
    /// that triggered the call.
    async fn record_failure(&self, analysis_id: Uuid, message: &str) -> InventoryResult<()>;

    /// Candidate codebases for the auto-refresh scheduler: non-stale,
    /// non-private, viewed within `viewed_within_days`.
    ///
    /// # Errors
    /// Returns a query failure from the underlying pool.
    async fn list_refresh_candidates(
        &self,
        viewed_within_days: i64,
    ) -> InventoryResult<Vec<RefreshCandidate>>;
}
