//! `PostgreSQL` implementation of the durable job queue

use crate::error::{QueueError, QueueErrorExt, QueueOperation, QueueResult};
use crate::models::{JobRow, JobState, NewJob};
use crate::traits::{ClaimedJob, JobQueue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration as StdDuration;
use uuid::Uuid;

/// `PostgreSQL`-backed job queue using the `FOR UPDATE SKIP LOCKED` claim pattern.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    initial_backoff_seconds: i64,
    subscribe_poll_interval: StdDuration,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, initial_backoff_seconds: u64) -> Self {
        Self {
            pool,
            initial_backoff_seconds: i64::try_from(initial_backoff_seconds).unwrap_or(i64::MAX),
            subscribe_poll_interval: StdDuration::from_millis(500),
        }
    }

    #[must_use]
    pub const fn with_subscribe_poll_interval(mut self, interval: StdDuration) -> Self {
        self.subscribe_poll_interval = interval;
        self
    }

    /// `attempt^2 * initial_backoff`, per the retry schedule.
    fn backoff_for(&self, attempt: i32) -> Duration {
        let attempt = i64::from(attempt.max(1));
        #[allow(clippy::arithmetic_side_effects)]
        let seconds = attempt.saturating_mul(attempt).saturating_mul(self.initial_backoff_seconds);
        Duration::seconds(seconds)
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn insert(&self, job: NewJob) -> QueueResult<Uuid> {
        let operation = QueueOperation::Insert {
            queue: job.queue.clone(),
            kind: job.kind.clone(),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_queue_err(operation.clone())?;

        if let Some(unique_key) = &job.unique_key
            && !job.unique_states.is_empty()
        {
            let state_strings: Vec<String> =
                job.unique_states.iter().map(ToString::to_string).collect();

            let existing = sqlx::query(
                r"
                SELECT id FROM jobs
                WHERE kind = $1 AND unique_key = $2 AND state = ANY($3)
                FOR UPDATE
                LIMIT 1
                ",
            )
            .bind(&job.kind)
            .bind(unique_key)
            .bind(&state_strings)
            .fetch_optional(&mut *tx)
            .await
            .map_queue_err(operation.clone())?;

            if let Some(row) = existing {
                let id: Uuid = row
                    .try_get("id")
                    .map_err(|e| QueueError::from_sqlx(operation.clone(), e))?;
                tx.commit().await.map_queue_err(operation)?;
                return Ok(id);
            }
        }

        let scheduled_at = job.scheduled_at.unwrap_or_else(Utc::now);
        let initial_state = if job.scheduled_at.is_some() {
            JobState::Scheduled
        } else {
            JobState::Available
        };

        let row = sqlx::query(
            r"
            INSERT INTO jobs (kind, queue, priority, args, state, max_attempts, scheduled_at, unique_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(&job.kind)
        .bind(&job.queue)
        .bind(job.priority)
        .bind(&job.args)
        .bind(initial_state.to_string())
        .bind(job.max_attempts)
        .bind(scheduled_at)
        .bind(&job.unique_key)
        .fetch_one(&mut *tx)
        .await
        .map_queue_err(operation.clone())?;

        tx.commit().await.map_queue_err(operation.clone())?;

        row.try_get("id")
            .map_err(|e| QueueError::from_sqlx(operation, e))
    }

    async fn fetch(&self, queue: &str, batch_size: u32) -> QueueResult<Vec<ClaimedJob>> {
        let operation = QueueOperation::Fetch {
            queue: queue.to_string(),
            batch_size,
        };

        let now = Utc::now();
        let limit = i64::from(batch_size);

        let rows = sqlx::query_as::<_, JobRow>(
            r"
            WITH claimed AS (
                SELECT id
                FROM jobs
                WHERE queue = $1
                  AND state IN ('available', 'retryable', 'scheduled')
                  AND scheduled_at <= $2
                ORDER BY priority ASC, scheduled_at ASC, id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET state = 'running',
                attempt = jobs.attempt + 1,
                attempted_at = $2
            FROM claimed
            WHERE jobs.id = claimed.id
            RETURNING jobs.id, jobs.kind, jobs.queue, jobs.priority, jobs.args, jobs.state,
                      jobs.attempt, jobs.max_attempts, jobs.scheduled_at, jobs.attempted_at,
                      jobs.finalized_at, jobs.errors, jobs.metadata, jobs.unique_key, jobs.created_at
            ",
        )
        .bind(queue)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_queue_err(operation)?;

        Ok(rows.into_iter().map(|row| ClaimedJob { row }).collect())
    }

    async fn complete(&self, job_id: Uuid) -> QueueResult<()> {
        let operation = QueueOperation::Complete { job_id };

        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'completed', finalized_at = NOW()
            WHERE id = $1 AND state = 'running'
            ",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_queue_err(operation.clone())?;

        if result.rows_affected() == 0 {
            return Err(self.state_conflict_or_not_found(job_id, operation).await);
        }

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> QueueResult<()> {
        let operation = QueueOperation::Fail { job_id };

        let row = sqlx::query(
            r"
            SELECT attempt, max_attempts FROM jobs WHERE id = $1 AND state = 'running'
            FOR UPDATE
            ",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_queue_err(operation.clone())?;

        let Some(row) = row else {
            return Err(self.state_conflict_or_not_found(job_id, operation).await);
        };

        let attempt: i32 = row
            .try_get("attempt")
            .map_err(|e| QueueError::from_sqlx(operation.clone(), e))?;
        let max_attempts: i32 = row
            .try_get("max_attempts")
            .map_err(|e| QueueError::from_sqlx(operation.clone(), e))?;

        if attempt >= max_attempts {
            sqlx::query(
                r"
                UPDATE jobs
                SET state = 'discarded',
                    finalized_at = NOW(),
                    errors = errors || to_jsonb($2::text)
                WHERE id = $1
                ",
            )
            .bind(job_id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_queue_err(operation)?;
        } else {
            let next_run = Utc::now() + self.backoff_for(attempt);
            sqlx::query(
                r"
                UPDATE jobs
                SET state = 'retryable',
                    scheduled_at = $2,
                    errors = errors || to_jsonb($3::text)
                WHERE id = $1
                ",
            )
            .bind(job_id)
            .bind(next_run)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_queue_err(operation)?;
        }

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> QueueResult<()> {
        let operation = QueueOperation::Cancel { job_id };

        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'cancelled', finalized_at = NOW()
            WHERE id = $1 AND state NOT IN ('completed', 'cancelled', 'discarded')
            ",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_queue_err(operation.clone())?;

        if result.rows_affected() == 0 {
            return Err(self.state_conflict_or_not_found(job_id, operation).await);
        }

        Ok(())
    }

    async fn snooze(&self, job_id: Uuid, run_at: DateTime<Utc>) -> QueueResult<()> {
        let operation = QueueOperation::Snooze { job_id };

        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'scheduled', scheduled_at = $2
            WHERE id = $1 AND state NOT IN ('completed', 'cancelled', 'discarded')
            ",
        )
        .bind(job_id)
        .bind(run_at)
        .execute(&self.pool)
        .await
        .map_queue_err(operation.clone())?;

        if result.rows_affected() == 0 {
            return Err(self.state_conflict_or_not_found(job_id, operation).await);
        }

        Ok(())
    }

    async fn update_metadata(&self, job_id: Uuid, patch: serde_json::Value) -> QueueResult<()> {
        let operation = QueueOperation::UpdateMetadata { job_id };

        let result = sqlx::query(
            r"
            UPDATE jobs
            SET metadata = metadata || $2::jsonb
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(patch)
        .execute(&self.pool)
        .await
        .map_queue_err(operation.clone())?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound {
                job_id,
                operation: Box::new(operation),
            });
        }

        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> QueueResult<Option<JobRow>> {
        let operation = QueueOperation::Query {
            description: format!("get(job_id={job_id})"),
        };

        sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_queue_err(operation)
    }

    async fn subscribe(&self, job_id: Uuid) -> QueueResult<JobRow> {
        loop {
            let operation = QueueOperation::Query {
                description: format!("subscribe(job_id={job_id})"),
            };

            let row = self.get(job_id).await?.ok_or_else(|| QueueError::JobNotFound {
                job_id,
                operation: Box::new(operation),
            })?;

            if row.state().map(JobState::is_terminal).unwrap_or(true) {
                return Ok(row);
            }

            tokio::time::sleep(self.subscribe_poll_interval).await;
        }
    }
}

impl PostgresJobQueue {
    async fn state_conflict_or_not_found(&self, job_id: Uuid, operation: QueueOperation) -> QueueError {
        match self.get(job_id).await {
            Ok(Some(row)) => QueueError::InvalidStateTransition {
                job_id,
                current_state: row.state,
                operation: Box::new(operation),
            },
            _ => QueueError::JobNotFound {
                job_id,
                operation: Box::new(operation),
            },
        }
    }
}
