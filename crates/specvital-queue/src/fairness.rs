//! Optional per-user fairness gate (§4.1 "Fairness and timeouts").
//!
//! Instance-local, like the clone semaphore in `specvital-orchestrator`: it
//! protects one process's worker slots from being monopolized by a single
//! user's backlog, not a cluster-wide budget (§9 "Instance-local
//! concurrency"). Disabled unless a caller constructs one and checks it in
//! the dispatch loop — the dispatcher works identically without it.

use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Tracks concurrent-running job counts per `(queue, user_id)` and decides
/// whether a newly claimed job should be admitted or snoozed.
pub struct FairnessGate {
    max_concurrent_per_user: usize,
    running: DashMap<(String, String), AtomicUsize>,
}

impl FairnessGate {
    #[must_use]
    pub fn new(max_concurrent_per_user: usize) -> Self {
        Self { max_concurrent_per_user, running: DashMap::new() }
    }

    /// Returns `true` and reserves a slot if `user_id` is under the
    /// per-tier concurrent-running limit on `queue`; otherwise returns
    /// `false` without reserving anything.
    pub fn try_admit(&self, queue: &str, user_id: &str) -> bool {
        let key = (queue.to_string(), user_id.to_string());
        let entry = self.running.entry(key).or_insert_with(|| AtomicUsize::new(0));
        let mut current = entry.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrent_per_user {
                return false;
            }
            match entry.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a slot reserved by `try_admit`. Idempotent no-op if the
    /// `(queue, user_id)` pair was never admitted.
    pub fn release(&self, queue: &str, user_id: &str) {
        if let Some(entry) = self.running.get(&(queue.to_string(), user_id.to_string())) {
            entry.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1))).ok();
        }
    }

    /// A bounded random jitter delay for the snooze issued when the gate
    /// rejects a job, so many gated jobs for the same user don't all wake
    /// at once and re-contend for the same slot.
    #[must_use]
    pub fn jitter_delay(min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let span = max.saturating_sub(min);
        let jitter_ms = rand::rng().random_range(0..=span.as_millis().max(1));
        #[allow(clippy::cast_possible_truncation)]
        let jitter = Duration::from_millis(jitter_ms as u64);
        min + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let gate = FairnessGate::new(2);
        assert!(gate.try_admit("analysis_default", "user-1"));
        assert!(gate.try_admit("analysis_default", "user-1"));
        assert!(!gate.try_admit("analysis_default", "user-1"));
    }

    #[test]
    fn release_frees_a_slot() {
        let gate = FairnessGate::new(1);
        assert!(gate.try_admit("analysis_default", "user-1"));
        assert!(!gate.try_admit("analysis_default", "user-1"));
        gate.release("analysis_default", "user-1");
        assert!(gate.try_admit("analysis_default", "user-1"));
    }

    #[test]
    fn tiers_and_users_are_independent() {
        let gate = FairnessGate::new(1);
        assert!(gate.try_admit("analysis_default", "user-1"));
        assert!(gate.try_admit("analysis_priority", "user-1"));
        assert!(gate.try_admit("analysis_default", "user-2"));
    }

    #[test]
    fn jitter_delay_stays_within_bounds() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(500);
        for _ in 0..50 {
            let d = FairnessGate::jitter_delay(min, max);
            assert!(d >= min && d <= max);
        }
    }
}
