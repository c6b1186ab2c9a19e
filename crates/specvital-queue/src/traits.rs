//! The durable job queue capability

use crate::error::QueueResult;
use crate::models::{JobRow, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A claimed job handed to a worker by `fetch`, carrying what it needs to
/// report back via `complete`/`fail`/`snooze` without a second round trip.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub row: JobRow,
}

/// Durable, `PostgreSQL`-backed job queue.
///
/// Implementations must make `fetch` safe for multiple concurrent workers
/// polling the same queue: no two workers may be handed the same job.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a new job. If `unique_key` is set and an existing job with the
    /// same `(kind, unique_key)` is in one of `unique_states`, this is a
    /// silent no-op that returns the existing job's id.
    async fn insert(&self, job: NewJob) -> QueueResult<Uuid>;

    /// Claim up to `batch_size` available jobs from `queue`, ordered by
    /// priority (descending) then `scheduled_at` (ascending).
    async fn fetch(&self, queue: &str, batch_size: u32) -> QueueResult<Vec<ClaimedJob>>;

    /// Mark a running job as completed.
    async fn complete(&self, job_id: Uuid) -> QueueResult<()>;

    /// Record a failure. If the job's attempt count is still below
    /// `max_attempts`, it is rescheduled with backoff `attempt^2 *
    /// initial_backoff`; otherwise it is discarded.
    async fn fail(&self, job_id: Uuid, error: &str) -> QueueResult<()>;

    /// Cancel a job that has not yet completed.
    async fn cancel(&self, job_id: Uuid) -> QueueResult<()>;

    /// Reschedule a job to run again at `run_at`, without counting it as an
    /// attempt or a failure.
    async fn snooze(&self, job_id: Uuid, run_at: DateTime<Utc>) -> QueueResult<()>;

    /// Merge `patch` into the job's `metadata` column.
    async fn update_metadata(&self, job_id: Uuid, patch: serde_json::Value) -> QueueResult<()>;

    /// Look up a single job by id.
    async fn get(&self, job_id: Uuid) -> QueueResult<Option<JobRow>>;

    /// Subscribe to completion notifications for a specific job.
    ///
    /// Returns a future that resolves once the job reaches a terminal state,
    /// or immediately if it is already terminal at subscription time.
    async fn subscribe(&self, job_id: Uuid) -> QueueResult<JobRow>;
}
