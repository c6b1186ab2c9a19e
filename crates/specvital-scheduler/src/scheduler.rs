//! Refresh scheduler: a leader-elected, cron-triggered loop that re-enqueues
//! analyze jobs for codebases whose inventory has gone stale.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use specvital_inventory::InventoryStore;
use specvital_lock::DistributedLock;
use specvital_queue::{kinds, queues, JobQueue, JobState, NewJob};

use crate::decay::{decay, is_eligible};
use crate::error::{SchedulerError, SchedulerResult};

/// Candidates are drawn from codebases viewed within this many days; beyond
/// that the decay policy's hard cutoff would exclude them anyway, but
/// filtering at the query keeps the candidate set small.
const VIEWED_WITHIN_DAYS: i64 = 90;

/// Consecutive `failed` analyses (since the last `completed` one, or since
/// the beginning if none) before a candidate self-excludes. A private repo
/// that can no longer be cloned without credentials hits this ceiling and
/// stops being retried forever.
const MAX_CONSECUTIVE_FAILURES: i64 = 5;

/// What one `tick` did, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub considered: u32,
    pub enqueued: u32,
    pub excluded_failures: u32,
    pub excluded_stale: u32,
    pub not_due: u32,
    pub enqueue_errors: u32,
}

pub struct RefreshScheduler {
    lock: Arc<dyn DistributedLock>,
    inventory: Arc<dyn InventoryStore>,
    queue: Arc<dyn JobQueue>,
    lock_key: i64,
    batch_size: i64,
    min_refresh_interval_hours: i64,
    max_refresh_interval_hours: i64,
}

impl RefreshScheduler {
    pub fn new(
        lock: Arc<dyn DistributedLock>,
        inventory: Arc<dyn InventoryStore>,
        queue: Arc<dyn JobQueue>,
        lock_key: i64,
        batch_size: i64,
        min_refresh_interval_hours: i64,
        max_refresh_interval_hours: i64,
    ) -> Self {
        Self {
            lock,
            inventory,
            queue,
            lock_key,
            batch_size,
            min_refresh_interval_hours,
            max_refresh_interval_hours,
        }
    }

    /// Run one tick: acquire the leader lock, select and enqueue refresh
    /// candidates, release the lock on the way out regardless of outcome.
    ///
    /// Returns `Ok(None)` without doing any work if another instance holds
    /// the lock.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> SchedulerResult<Option<TickReport>> {
        let Some(guard) = self
            .lock
            .try_acquire(self.lock_key)
            .await
            .map_err(SchedulerError::LockFailed)?
        else {
            tracing::debug!("scheduler lock held by another instance, skipping tick");
            return Ok(None);
        };

        let result = self.run_tick().await;

        if let Err(release_err) = guard.release().await {
            tracing::warn!(error = %release_err, "failed to release scheduler lock");
        }

        result.map(Some)
    }

    async fn run_tick(&self) -> SchedulerResult<TickReport> {
        let candidates = self
            .inventory
            .list_refresh_candidates(VIEWED_WITHIN_DAYS)
            .await
            .map_err(SchedulerError::CandidateListFailed)?;

        let now = Utc::now();
        let mut report = TickReport::default();

        for candidate in candidates {
            if i64::from(report.enqueued) >= self.batch_size {
                break;
            }
            report.considered += 1;

            if candidate.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                report.excluded_failures += 1;
                continue;
            }

            let idle = now - candidate.last_viewed_at;
            let Some(decision) = decay(idle, self.min_refresh_interval_hours, self.max_refresh_interval_hours)
            else {
                report.excluded_stale += 1;
                continue;
            };

            if !is_eligible(candidate.last_completed_at, now, decision) {
                report.not_due += 1;
                continue;
            }

            let unique_key = format!(
                "{}/{}/{}@{}",
                candidate.host,
                candidate.owner,
                candidate.name,
                candidate.last_commit_sha.as_deref().unwrap_or("HEAD")
            );

            let job = NewJob::new(
                queues::ANALYSIS_SCHEDULED,
                kinds::ANALYZE,
                json!({
                    "owner": candidate.owner,
                    "repo": candidate.name,
                    "commit_sha": candidate.last_commit_sha,
                    "user_id": Option::<Uuid>::None,
                }),
            )
            .unique_by(
                unique_key,
                vec![JobState::Available, JobState::Running, JobState::Retryable],
            );

            match self.queue.insert(job).await {
                Ok(_job_id) => {
                    tracing::info!(
                        owner = %candidate.owner,
                        repo = %candidate.name,
                        band = decision.band,
                        "enqueued refresh analysis"
                    );
                    report.enqueued += 1;
                }
                Err(source) => {
                    tracing::warn!(owner = %candidate.owner, repo = %candidate.name, error = %source, "failed to enqueue refresh analysis");
                    report.enqueue_errors += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use specvital_inventory::MockInventoryStore;
    use specvital_lock::MockDistributedLock;
    use specvital_queue::MockJobQueue;

    fn scheduler(
        lock: MockDistributedLock,
        inventory: MockInventoryStore,
        queue: MockJobQueue,
    ) -> RefreshScheduler {
        RefreshScheduler::new(Arc::new(lock), Arc::new(inventory), Arc::new(queue), 42, 50, 1, 24 * 7)
    }

    #[tokio::test]
    async fn test_skips_tick_when_lock_is_held_elsewhere() {
        let lock = MockDistributedLock::new();
        let _held = lock.try_acquire(42).await.unwrap().unwrap();

        let scheduler = scheduler(lock, MockInventoryStore::new(), MockJobQueue::new());
        let report = scheduler.tick().await.unwrap();

        assert!(report.is_none());
    }

    #[tokio::test]
    async fn test_empty_candidate_list_enqueues_nothing() {
        let scheduler = scheduler(
            MockDistributedLock::new(),
            MockInventoryStore::new(),
            MockJobQueue::new(),
        );

        let report = scheduler.tick().await.unwrap().unwrap();
        assert_eq!(report, TickReport::default());
    }
}
