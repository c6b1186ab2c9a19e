//! `PostgreSQL` advisory-lock-backed distributed lock, used to elect a
//! single active refresh-scheduler instance across worker processes.

pub mod error;
pub mod mock;
pub mod postgres;
pub mod traits;

pub use error::{LockError, LockResult};
pub use mock::MockDistributedLock;
pub use postgres::PostgresDistributedLock;
pub use traits::{DistributedLock, LockGuard};
