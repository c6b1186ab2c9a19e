//! Domain models for the inventory schema: codebases, analyses, and the
//! file/suite/test tree a single analysis owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A registered repository, identified stably by `(host, external_repo_id)`
/// and separately (mutably) by `(host, owner, name)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Codebase {
    pub id: Uuid,
    pub host: String,
    pub external_repo_id: String,
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub is_private: bool,
    pub is_stale: bool,
    pub last_viewed_at: DateTime<Utc>,
}

/// Lifecycle state of a single parsing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown analysis status: {other}")),
        }
    }
}

/// A single parsing attempt against a `Codebase` at a `commit_sha`.
///
/// Created in `Running` state at clone time; transitions exactly once to
/// `Completed` or `Failed` and is never mutated thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Analysis {
    pub id: Uuid,
    pub codebase_id: Uuid,
    pub commit_sha: String,
    pub branch_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub total_suites: i32,
    pub total_tests: i32,
    pub parser_version: String,
}

impl Analysis {
    /// Parse the raw `status` column.
    ///
    /// # Errors
    /// Returns an error string if the database holds a status outside the
    /// known set, indicating database/application drift.
    pub fn status(&self) -> Result<AnalysisStatus, String> {
        AnalysisStatus::from_str(&self.status)
    }
}

/// Parameters for `InventoryStore::create_analysis_record`.
#[derive(Debug, Clone)]
pub struct CreateAnalysisParams {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub commit_sha: String,
    pub parser_version: String,
    /// Caller-supplied id for cross-service correlation. A nil UUID is
    /// rejected by the store.
    pub analysis_id: Option<Uuid>,
}

/// A file the parser identified as containing tests, scoped to one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestFile {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub path: String,
    pub framework: Option<String>,
    pub domain_hints: Vec<String>,
}

/// A suite node, optionally nested inside another suite. `depth` 0 is a
/// file-level root; siblings at the same depth share the same parent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestSuite {
    pub id: Uuid,
    pub file_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub line_number: Option<i32>,
    pub depth: i32,
}

/// Lifecycle/annotation status of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCaseStatus {
    Active,
    Skipped,
    Todo,
    Focused,
    Xfail,
}

impl fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Skipped => "skipped",
            Self::Todo => "todo",
            Self::Focused => "focused",
            Self::Xfail => "xfail",
        };
        write!(f, "{s}")
    }
}

/// A leaf test case under a `TestSuite`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestCase {
    pub id: Uuid,
    pub suite_id: Uuid,
    pub name: String,
    pub line_number: Option<i32>,
    pub status: String,
    pub tags: Vec<String>,
    pub modifier: Option<String>,
}

/// A codebase eligible for scheduled refresh, as produced by the
/// `RefreshCandidate` view over `codebases` + `analyses`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshCandidate {
    pub codebase_id: Uuid,
    pub host: String,
    pub owner: String,
    pub name: String,
    pub last_viewed_at: DateTime<Utc>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_commit_sha: Option<String>,
    pub last_parser_version: Option<String>,
    /// Count of `failed` analyses strictly newer than the most recent
    /// `completed` one for this codebase.
    pub consecutive_failures: i64,
}

/// Maximum byte length of a persisted `TestCase.name`, per the truncation invariant.
pub const TEST_CASE_NAME_MAX_BYTES: usize = 2000;

/// Maximum byte length of a persisted `TestSuite.name`, per the truncation invariant.
pub const TEST_SUITE_NAME_MAX_BYTES: usize = 500;

/// Maximum byte length of a persisted `Analysis.error_message`.
pub const ERROR_MESSAGE_MAX_BYTES: usize = 1000;

/// Truncate `s` to at most `max_bytes` bytes on a UTF-8 char boundary,
/// appending `"…"` (3 bytes) when truncation actually occurs.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let ellipsis = "…";
    let budget = max_bytes.saturating_sub(ellipsis.len());
    let mut end = budget.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = String::with_capacity(end + ellipsis.len());
    out.push_str(&s[..end]);
    out.push_str(ellipsis);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_status_roundtrip() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Running,
            AnalysisStatus::Completed,
            AnalysisStatus::Failed,
        ] {
            let parsed: AnalysisStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_truncate_utf8_noop_under_limit() {
        assert_eq!(truncate_utf8("short", 2000), "short");
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundary() {
        // "é" is 2 bytes; force truncation right at the boundary.
        let s = "a".repeat(9) + "é";
        let truncated = truncate_utf8(&s, 10);
        assert!(truncated.is_char_boundary(truncated.len() - "…".len()));
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= 10);
    }

    #[test]
    fn test_truncate_utf8_exact_limit_no_ellipsis() {
        let s = "a".repeat(10);
        assert_eq!(truncate_utf8(&s, 10), s);
    }
}
