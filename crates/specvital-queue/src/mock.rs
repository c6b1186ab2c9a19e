//! In-memory `JobQueue` for unit testing callers of this crate

use crate::error::{QueueError, QueueOperation, QueueResult};
use crate::models::{JobRow, JobState, NewJob};
use crate::traits::{ClaimedJob, JobQueue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory job queue backed by a `Vec<JobRow>` behind a mutex.
///
/// Mirrors `PostgresJobQueue`'s externally-visible state machine without a
/// database, for use in tests of orchestrator/scheduler code.
#[derive(Clone)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<JobRow>>>,
    initial_backoff_seconds: i64,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            initial_backoff_seconds: 15,
        }
    }

    #[must_use]
    pub const fn with_initial_backoff_seconds(mut self, seconds: i64) -> Self {
        self.initial_backoff_seconds = seconds;
        self
    }

    fn backoff_for(&self, attempt: i32) -> chrono::Duration {
        let attempt = i64::from(attempt.max(1));
        #[allow(clippy::arithmetic_side_effects)]
        let seconds = attempt.saturating_mul(attempt).saturating_mul(self.initial_backoff_seconds);
        chrono::Duration::seconds(seconds)
    }

    /// Snapshot of all jobs, for test assertions.
    pub fn all(&self) -> Vec<JobRow> {
        #[allow(clippy::unwrap_used)]
        self.jobs.lock().unwrap().clone()
    }
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn insert(&self, job: NewJob) -> QueueResult<Uuid> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();

        if let Some(unique_key) = &job.unique_key
            && !job.unique_states.is_empty()
        {
            let state_names: Vec<String> =
                job.unique_states.iter().map(ToString::to_string).collect();
            if let Some(existing) = jobs.iter().find(|j| {
                j.kind == job.kind
                    && j.unique_key.as_deref() == Some(unique_key.as_str())
                    && state_names.contains(&j.state)
            }) {
                return Ok(existing.id);
            }
        }

        let scheduled_at = job.scheduled_at.unwrap_or_else(Utc::now);
        let initial_state = if job.scheduled_at.is_some() {
            JobState::Scheduled
        } else {
            JobState::Available
        };

        let id = Uuid::new_v4();
        jobs.push(JobRow {
            id,
            kind: job.kind,
            queue: job.queue,
            priority: job.priority,
            args: job.args,
            state: initial_state.to_string(),
            attempt: 0,
            max_attempts: job.max_attempts,
            scheduled_at,
            attempted_at: None,
            finalized_at: None,
            errors: serde_json::json!([]),
            metadata: serde_json::json!({}),
            unique_key: job.unique_key,
            created_at: Utc::now(),
        });

        Ok(id)
    }

    async fn fetch(&self, queue: &str, batch_size: u32) -> QueueResult<Vec<ClaimedJob>> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();
        let now = Utc::now();

        let mut candidates: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| {
                j.queue == queue
                    && matches!(j.state.as_str(), "available" | "retryable" | "scheduled")
                    && j.scheduled_at <= now
            })
            .map(|(idx, _)| idx)
            .collect();

        candidates.sort_by(|&a, &b| {
            jobs[a]
                .priority
                .cmp(&jobs[b].priority)
                .then(jobs[a].scheduled_at.cmp(&jobs[b].scheduled_at))
                .then(jobs[a].id.cmp(&jobs[b].id))
        });
        candidates.truncate(batch_size as usize);

        let mut claimed = Vec::new();
        for idx in candidates {
            #[allow(clippy::arithmetic_side_effects)]
            if let Some(job) = jobs.get_mut(idx) {
                job.state = JobState::Running.to_string();
                job.attempt += 1;
                job.attempted_at = Some(now);
                claimed.push(ClaimedJob { row: job.clone() });
            }
        }

        Ok(claimed)
    }

    async fn complete(&self, job_id: Uuid) -> QueueResult<()> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| not_found(job_id, "complete"))?;

        if job.state != "running" {
            return Err(state_conflict(job_id, &job.state, "complete"));
        }
        job.state = JobState::Completed.to_string();
        job.finalized_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> QueueResult<()> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();
        let backoff = self.backoff_for(
            jobs.iter()
                .find(|j| j.id == job_id)
                .map_or(1, |j| j.attempt),
        );
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| not_found(job_id, "fail"))?;

        if job.state != "running" {
            return Err(state_conflict(job_id, &job.state, "fail"));
        }

        if let Some(arr) = job.errors.as_array_mut() {
            arr.push(serde_json::Value::String(error.to_string()));
        }

        if job.attempt >= job.max_attempts {
            job.state = JobState::Discarded.to_string();
            job.finalized_at = Some(Utc::now());
        } else {
            job.state = JobState::Retryable.to_string();
            job.scheduled_at = Utc::now() + backoff;
        }

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> QueueResult<()> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| not_found(job_id, "cancel"))?;

        if matches!(job.state.as_str(), "completed" | "cancelled" | "discarded") {
            return Err(state_conflict(job_id, &job.state, "cancel"));
        }
        job.state = JobState::Cancelled.to_string();
        job.finalized_at = Some(Utc::now());
        Ok(())
    }

    async fn snooze(&self, job_id: Uuid, run_at: DateTime<Utc>) -> QueueResult<()> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| not_found(job_id, "snooze"))?;

        if matches!(job.state.as_str(), "completed" | "cancelled" | "discarded") {
            return Err(state_conflict(job_id, &job.state, "snooze"));
        }
        job.state = JobState::Scheduled.to_string();
        job.scheduled_at = run_at;
        Ok(())
    }

    async fn update_metadata(&self, job_id: Uuid, patch: serde_json::Value) -> QueueResult<()> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| not_found(job_id, "update_metadata"))?;

        if let (Some(base), Some(patch_obj)) = (job.metadata.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_obj {
                base.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> QueueResult<Option<JobRow>> {
        #[allow(clippy::unwrap_used)]
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn subscribe(&self, job_id: Uuid) -> QueueResult<JobRow> {
        self.get(job_id).await?.ok_or_else(|| not_found(job_id, "subscribe"))
    }
}

fn not_found(job_id: Uuid, op: &str) -> QueueError {
    QueueError::JobNotFound {
        job_id,
        operation: Box::new(QueueOperation::Query {
            description: op.to_string(),
        }),
    }
}

fn state_conflict(job_id: Uuid, current_state: &str, op: &str) -> QueueError {
    QueueError::InvalidStateTransition {
        job_id,
        current_state: current_state.to_string(),
        operation: Box::new(QueueOperation::Query {
            description: op.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::queues;

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let queue = MockJobQueue::new();
        let job = NewJob::new(queues::ANALYSIS_DEFAULT, "analyze_commit", serde_json::json!({}));
        let id = queue.insert(job).await.unwrap();

        let claimed = queue.fetch(queues::ANALYSIS_DEFAULT, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].row.id, id);
        assert_eq!(claimed[0].row.state, "running");
    }

    #[tokio::test]
    async fn test_fetch_respects_priority() {
        let queue = MockJobQueue::new();
        let low = NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({})).with_priority(4);
        let high = NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({})).with_priority(1);
        queue.insert(low).await.unwrap();
        let high_id = queue.insert(high).await.unwrap();

        let claimed = queue.fetch(queues::ANALYSIS_DEFAULT, 1).await.unwrap();
        assert_eq!(claimed[0].row.id, high_id);
    }

    #[tokio::test]
    async fn test_complete_requires_running_state() {
        let queue = MockJobQueue::new();
        let job = NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({}));
        let id = queue.insert(job).await.unwrap();

        let result = queue.complete(id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fail_retries_then_discards() {
        let queue = MockJobQueue::new();
        let job = NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({}))
            .with_max_attempts(2);
        let id = queue.insert(job).await.unwrap();

        queue.fetch(queues::ANALYSIS_DEFAULT, 1).await.unwrap();
        queue.fail(id, "boom").await.unwrap();
        let row = queue.get(id).await.unwrap().unwrap();
        assert_eq!(row.state, "retryable");

        // make it immediately claimable again
        {
            #[allow(clippy::unwrap_used)]
            let mut jobs = queue.jobs.lock().unwrap();
            if let Some(j) = jobs.iter_mut().find(|j| j.id == id) {
                j.scheduled_at = Utc::now() - chrono::Duration::seconds(1);
            }
        }
        queue.fetch(queues::ANALYSIS_DEFAULT, 1).await.unwrap();
        queue.fail(id, "boom again").await.unwrap();
        let row = queue.get(id).await.unwrap().unwrap();
        assert_eq!(row.state, "discarded");
    }

    #[tokio::test]
    async fn test_unique_insert_dedups() {
        let queue = MockJobQueue::new();
        let job1 = NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({}))
            .unique_by("repo-1", vec![JobState::Available, JobState::Running]);
        let job2 = NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({}))
            .unique_by("repo-1", vec![JobState::Available, JobState::Running]);

        let id1 = queue.insert(job1).await.unwrap();
        let id2 = queue.insert(job2).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(queue.all().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_fails() {
        let queue = MockJobQueue::new();
        let id = queue
            .insert(NewJob::new(queues::ANALYSIS_DEFAULT, "k", serde_json::json!({})))
            .await
            .unwrap();
        queue.fetch(queues::ANALYSIS_DEFAULT, 1).await.unwrap();
        queue.complete(id).await.unwrap();

        let result = queue.cancel(id).await;
        assert!(result.is_err());
    }
}
