//! Job queue data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The six priority tiers jobs can be inserted into.
///
/// `analysis_*` tiers feed the analyze orchestrator; `specview_*` tiers feed
/// lighter-weight spec-view refresh work. Within each domain, `priority` jobs
/// are claimed before `default`, which is claimed before `scheduled`.
pub mod queues {
    pub const ANALYSIS_PRIORITY: &str = "analysis_priority";
    pub const ANALYSIS_DEFAULT: &str = "analysis_default";
    pub const ANALYSIS_SCHEDULED: &str = "analysis_scheduled";
    pub const SPECVIEW_PRIORITY: &str = "specview_priority";
    pub const SPECVIEW_DEFAULT: &str = "specview_default";
    pub const SPECVIEW_SCHEDULED: &str = "specview_scheduled";
}

/// Job `kind` identifiers, shared between producers (the API, the refresh
/// scheduler) and the worker that dispatches on them.
pub mod kinds {
    pub const ANALYZE: &str = "analyze";
}

/// Job lifecycle state.
///
/// `Available` and `Scheduled` jobs are eligible for `fetch` once their
/// `scheduled_at` has passed. `Running` jobs are held by a worker.
/// `Retryable` jobs are waiting out a backoff window before becoming
/// `Available` again. `Completed`, `Cancelled`, and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Available,
    Scheduled,
    Running,
    Retryable,
    Cancelled,
    Discarded,
    Completed,
}

impl JobState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Discarded)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Retryable => "retryable",
            Self::Cancelled => "cancelled",
            Self::Discarded => "discarded",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "retryable" => Ok(Self::Retryable),
            "cancelled" => Ok(Self::Cancelled),
            "discarded" => Ok(Self::Discarded),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// A row in the durable job queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub kind: String,
    pub queue: String,
    pub priority: i16,
    pub args: serde_json::Value,
    pub state: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub errors: serde_json::Value,
    pub metadata: serde_json::Value,
    pub unique_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRow {
    /// Parse the raw `state` column into a `JobState`.
    ///
    /// # Errors
    /// Returns an error string if the database holds a state outside the
    /// known set, which indicates database/application drift.
    pub fn state(&self) -> Result<JobState, String> {
        JobState::from_str(&self.state)
    }
}

/// Input for `JobQueue::insert`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: String,
    pub queue: String,
    pub priority: i16,
    pub args: serde_json::Value,
    pub max_attempts: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When set, a second insert with the same (kind, `unique_key`) while an
    /// existing job is in one of `unique_states` is a silent no-op.
    pub unique_key: Option<String>,
    pub unique_states: Vec<JobState>,
}

impl NewJob {
    pub fn new(queue: impl Into<String>, kind: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            queue: queue.into(),
            priority: 0,
            args,
            max_attempts: 3,
            scheduled_at: None,
            unique_key: None,
            unique_states: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    #[must_use]
    pub fn unique_by(mut self, key: impl Into<String>, states: Vec<JobState>) -> Self {
        self.unique_key = Some(key.into());
        self.unique_states = states;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_roundtrip() {
        for state in [
            JobState::Available,
            JobState::Scheduled,
            JobState::Running,
            JobState::Retryable,
            JobState::Cancelled,
            JobState::Discarded,
            JobState::Completed,
        ] {
            let parsed: JobState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Discarded.is_terminal());
        assert!(!JobState::Available.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Retryable.is_terminal());
    }
}
