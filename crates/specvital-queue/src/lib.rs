//! Durable, `PostgreSQL`-backed job queue for analysis and refresh work.
//!
//! Jobs are claimed with `FOR UPDATE SKIP LOCKED` so multiple worker
//! processes can poll the same queue without double-claiming, retried with
//! `attempt^2 * initial_backoff` on failure, and deduplicated by an optional
//! `(kind, unique_key)` pair scoped to a caller-supplied set of states.

pub mod error;
pub mod fairness;
pub mod migrations;
pub mod mock;
pub mod models;
pub mod postgres;
pub mod traits;

pub use error::{QueueError, QueueErrorExt, QueueOperation, QueueResult};
pub use fairness::FairnessGate;
pub use mock::MockJobQueue;
pub use models::{kinds, queues, JobRow, JobState, NewJob};
pub use postgres::PostgresJobQueue;
pub use traits::{ClaimedJob, JobQueue};
