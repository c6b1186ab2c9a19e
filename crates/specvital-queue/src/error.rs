//! Structured error handling for the durable job queue

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Queue operation type, carried on errors for observability
#[derive(Debug, Clone)]
pub enum QueueOperation {
    Insert { queue: String, kind: String },
    Fetch { queue: String, batch_size: u32 },
    Complete { job_id: Uuid },
    Fail { job_id: Uuid },
    Cancel { job_id: Uuid },
    Snooze { job_id: Uuid },
    UpdateMetadata { job_id: Uuid },
    Query { description: String },
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { queue, kind } => write!(f, "insert(queue={queue}, kind={kind})"),
            Self::Fetch { queue, batch_size } => {
                write!(f, "fetch(queue={queue}, batch_size={batch_size})")
            }
            Self::Complete { job_id } => write!(f, "complete(job_id={job_id})"),
            Self::Fail { job_id } => write!(f, "fail(job_id={job_id})"),
            Self::Cancel { job_id } => write!(f, "cancel(job_id={job_id})"),
            Self::Snooze { job_id } => write!(f, "snooze(job_id={job_id})"),
            Self::UpdateMetadata { job_id } => write!(f, "update_metadata(job_id={job_id})"),
            Self::Query { description } => write!(f, "query({description})"),
        }
    }
}

/// Comprehensive queue error with full context
#[derive(Debug, Error)]
pub enum QueueError {
    /// A job referenced by id does not exist
    #[error("Job not found: {job_id} (operation='{operation}')")]
    JobNotFound {
        job_id: Uuid,
        operation: Box<QueueOperation>,
    },

    /// A job was fetched, completed, or cancelled while in an incompatible state
    #[error("Job {job_id} is in state '{current_state}', cannot {operation}")]
    InvalidStateTransition {
        job_id: Uuid,
        current_state: String,
        operation: Box<QueueOperation>,
    },

    /// Underlying query execution error
    #[error("Query failed for operation '{operation}': {message} (correlation_id={correlation_id:?})")]
    QueryFailed {
        operation: Box<QueueOperation>,
        message: String,
        correlation_id: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    /// Constraint violation, most commonly the unique-by-args dedup index
    #[error(
        "Queue constraint violation in table '{table}': {constraint} (operation='{operation}')"
    )]
    ConstraintViolation {
        table: String,
        constraint: String,
        operation: Box<QueueOperation>,
        #[source]
        source: sqlx::Error,
    },

    /// Unexpected database state (e.g. a RETURNING clause yielding no rows)
    #[error("Unexpected queue state for operation '{operation}': {message}")]
    UnexpectedState {
        operation: Box<QueueOperation>,
        message: String,
    },
}

impl QueueError {
    /// Build a `QueryFailed` or `ConstraintViolation` error from a raw `sqlx::Error`
    pub fn from_sqlx(operation: QueueOperation, source: sqlx::Error) -> Self {
        if let Some(db_err) = source.as_database_error()
            && let Some(constraint) = db_err.constraint()
        {
            let table = constraint
                .split('_')
                .next()
                .unwrap_or("unknown")
                .to_string();
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
}

/// Extension trait for converting sqlx errors with operation context
pub trait QueueErrorExt<T> {
    /// Convert to `QueueError` with operation context
    ///
    /// # Errors
    /// Returns `QueueError` describing the failed operation
    fn map_queue_err(self, operation: QueueOperation) -> QueueResult<T>;
}

impl<T> QueueErrorExt<T> for std::result::Result<T, sqlx::Error> {
    fn map_queue_err(self, operation: QueueOperation) -> QueueResult<T> {
        self.map_err(|e| QueueError::from_sqlx(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        let job_id = Uuid::nil();
        let op = QueueOperation::Complete { job_id };
        assert_eq!(op.to_string(), format!("complete(job_id={job_id})"));
    }
}
