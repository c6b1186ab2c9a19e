//! The distributed lock capability
//!
//! Used to elect a single active refresh-scheduler instance across however
//! many worker processes are deployed: every instance ticks on the same
//! interval, but only the one holding the lock acts on a tick.

use crate::error::LockResult;
use async_trait::async_trait;

/// A held lock. Dropping it without calling `release` still frees the lock
/// eventually (the session backing it is closed), but `release` returns the
/// connection to the pool for reuse and should be preferred.
#[async_trait]
pub trait LockGuard: Send {
    async fn release(self: Box<Self>) -> LockResult<()>;
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Attempt to acquire the named advisory lock without blocking.
    ///
    /// Returns `Ok(None)` if another holder currently has it.
    async fn try_acquire(&self, key: i64) -> LockResult<Option<Box<dyn LockGuard>>>;
}
