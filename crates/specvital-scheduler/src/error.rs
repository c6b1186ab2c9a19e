//! Structured error handling for the refresh scheduler

use thiserror::Error;

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to acquire the scheduler lock: {0}")]
    LockFailed(#[source] specvital_lock::LockError),

    #[error("failed to list refresh candidates: {0}")]
    CandidateListFailed(#[source] specvital_inventory::InventoryError),

    #[error("failed to enqueue refresh job for {owner}/{name}: {source}")]
    EnqueueFailed {
        owner: String,
        name: String,
        #[source]
        source: specvital_queue::QueueError,
    },
}
