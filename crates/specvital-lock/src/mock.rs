//! In-memory `DistributedLock` for unit testing schedulers without a database

use crate::error::LockResult;
use crate::traits::{DistributedLock, LockGuard};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockDistributedLock {
    held: Arc<Mutex<HashSet<i64>>>,
}

impl MockDistributedLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MockDistributedLock {
    async fn try_acquire(&self, key: i64) -> LockResult<Option<Box<dyn LockGuard>>> {
        #[allow(clippy::unwrap_used)]
        let mut held = self.held.lock().unwrap();
        if held.contains(&key) {
            return Ok(None);
        }
        held.insert(key);
        Ok(Some(Box::new(MockLockGuard {
            held: self.held.clone(),
            key,
        })))
    }
}

pub struct MockLockGuard {
    held: Arc<Mutex<HashSet<i64>>>,
    key: i64,
}

#[async_trait]
impl LockGuard for MockLockGuard {
    async fn release(self: Box<Self>) -> LockResult<()> {
        #[allow(clippy::unwrap_used)]
        self.held.lock().unwrap().remove(&self.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let lock = MockDistributedLock::new();
        let guard = lock.try_acquire(1).await.unwrap();
        assert!(guard.is_some());

        let second = lock.try_acquire(1).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let lock = MockDistributedLock::new();
        let guard = lock.try_acquire(1).await.unwrap().unwrap();
        guard.release().await.unwrap();

        let second = lock.try_acquire(1).await.unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_distinct_keys_are_independent() {
        let lock = MockDistributedLock::new();
        let a = lock.try_acquire(1).await.unwrap();
        let b = lock.try_acquire(2).await.unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
