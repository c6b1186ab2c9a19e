//! Structured error handling for the inventory persistence layer

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for inventory operations
pub type InventoryResult<T> = std::result::Result<T, InventoryError>;

/// Inventory operation type, carried on errors for observability
#[derive(Debug, Clone)]
pub enum InventoryOperation {
    UpsertCodebase { host: String, owner: String, name: String },
    CreateAnalysisRecord { owner: String, repo: String, commit_sha: String },
    SaveAnalysisInventory { analysis_id: Uuid },
    RecordFailure { analysis_id: Uuid },
    InsertSuites { analysis_id: Uuid, depth: u32, count: usize },
    InsertTestCases { analysis_id: Uuid, count: usize },
    ListRefreshCandidates,
    Query { description: String },
}

impl fmt::Display for InventoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpsertCodebase { host, owner, name } => {
                write!(f, "upsert_codebase(host={host}, owner={owner}, name={name})")
            }
            Self::CreateAnalysisRecord { owner, repo, commit_sha } => write!(
                f,
                "create_analysis_record(owner={owner}, repo={repo}, commit={commit_sha})"
            ),
            Self::SaveAnalysisInventory { analysis_id } => {
                write!(f, "save_analysis_inventory(analysis_id={analysis_id})")
            }
            Self::RecordFailure { analysis_id } => {
                write!(f, "record_failure(analysis_id={analysis_id})")
            }
            Self::InsertSuites { analysis_id, depth, count } => write!(
                f,
                "insert_suites(analysis_id={analysis_id}, depth={depth}, count={count})"
            ),
            Self::InsertTestCases { analysis_id, count } => {
                write!(f, "insert_test_cases(analysis_id={analysis_id}, count={count})")
            }
            Self::ListRefreshCandidates => write!(f, "list_refresh_candidates()"),
            Self::Query { description } => write!(f, "query({description})"),
        }
    }
}

/// Comprehensive inventory persistence error with full context
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No analysis exists with the given id
    #[error("Analysis not found: {analysis_id} (operation='{operation}')")]
    AnalysisNotFound {
        analysis_id: Uuid,
        operation: Box<InventoryOperation>,
    },

    /// A completed analysis already exists for this `(codebase_id, commit_sha)`,
    /// per the unique partial index. The caller must treat this as a permanent,
    /// silently-cancellable outcome, not a retryable failure.
    #[error("Analysis already completed for this commit (operation='{operation}')")]
    AlreadyCompleted { operation: Box<InventoryOperation> },

    /// A test case referenced a suite id with no corresponding inserted row
    #[error("No suite mapping for temp id '{temp_id}' while inserting test cases (operation='{operation}')")]
    MissingSuiteMapping {
        temp_id: String,
        operation: Box<InventoryOperation>,
    },

    /// Underlying query execution error
    #[error("Query failed for operation '{operation}': {message} (correlation_id={correlation_id:?})")]
    QueryFailed {
        operation: Box<InventoryOperation>,
        message: String,
        correlation_id: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    /// Constraint violation other than the completed-analysis dedup index
    #[error("Inventory constraint violation in table '{table}': {constraint} (operation='{operation}')")]
    ConstraintViolation {
        table: String,
        constraint: String,
        operation: Box<InventoryOperation>,
        #[source]
        source: sqlx::Error,
    },

    /// Bulk-copy stream for leaf test-case rows failed mid-stream
    #[error("Bulk copy of test cases failed (operation='{operation}'): {message}")]
    CopyFailed {
        operation: Box<InventoryOperation>,
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// Unexpected database state (e.g. a RETURNING clause yielding no rows)
    #[error("Unexpected inventory state for operation '{operation}': {message}")]
    UnexpectedState {
        operation: Box<InventoryOperation>,
        message: String,
    },
}

/// Name of the unique partial index that enforces at most one completed
/// analysis per `(codebase_id, commit_sha)`. Matched against
/// `sqlx::error::DatabaseError::constraint()` to classify a duplicate-key
/// error as `AlreadyCompleted` rather than a generic constraint violation.
const COMPLETED_ANALYSIS_UNIQUE_INDEX: &str = "analyses_codebase_commit_completed_idx";

impl InventoryError {
    /// Build a `QueryFailed`, `AlreadyCompleted`, or `ConstraintViolation`
    /// error from a raw `sqlx::Error`, classifying the completed-analysis
    /// dedup index by name so callers can distinguish a duplicate-completion
    /// race from any other constraint failure.
    pub fn from_sqlx(operation: InventoryOperation, source: sqlx::Error) -> Self {
        if let Some(db_err) = source.as_database_error()
            && let Some(constraint) = db_err.constraint()
        {
            if constraint == COMPLETED_ANALYSIS_UNIQUE_INDEX {
                return Self::AlreadyCompleted {
                    operation: Box::new(operation),
                };
            }

            let table = constraint.split('_').next().unwrap_or("unknown").to_string();
            return Self::ConstraintViolation {
                table,
                constraint: constraint.to_string(),
                operation: Box::new(operation),
                source,
            };
        }

        Self::QueryFailed {
            message: source.to_string(),
            operation: Box::new(operation),
            correlation_id: None,
            source,
        }
    }

    /// True for errors the caller should treat as permanent (not retryable).
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::AlreadyCompleted { .. })
    }
}

/// Extension trait for converting sqlx errors with operation context
pub trait InventoryErrorExt<T> {
    /// Convert to `InventoryError` with operation context
    ///
    /// # Errors
    /// Returns `InventoryError` describing the failed operation
    fn map_inventory_err(self, operation: InventoryOperation) -> InventoryResult<T>;
}

impl<T> InventoryErrorExt<T> for std::result::Result<T, sqlx::Error> {
    fn map_inventory_err(self, operation: InventoryOperation) -> InventoryResult<T> {
        self.map_err(|e| InventoryError::from_sqlx(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        let analysis_id = Uuid::nil();
        let op = InventoryOperation::RecordFailure { analysis_id };
        assert_eq!(op.to_string(), format!("record_failure(analysis_id={analysis_id})"));
    }

    #[test]
    fn test_already_completed_is_permanent() {
        let err = InventoryError::AlreadyCompleted {
            operation: Box::new(InventoryOperation::ListRefreshCandidates),
        };
        assert!(err.is_permanent());
    }
}
