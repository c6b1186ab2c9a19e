//! In-memory `SourceAcquirer` for unit testing callers of this crate

use crate::error::{SourceError, SourceResult};
use crate::traits::{Source, SourceAcquirer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[derive(Clone, Default)]
pub struct MockSourceAcquirer {
    pub fail_urls: Vec<String>,
    /// When set, every clone returns this fixed `(commit_sha, branch)` pair
    /// instead of echoing back the caller-requested commit, regardless of
    /// `token`.
    pub fixed_commit: Option<(String, String, Option<DateTime<Utc>>)>,
}

impl MockSourceAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.fail_urls.push(url.into());
        self
    }

    /// Every subsequent `clone` call returns `commit_sha`/`branch` verbatim,
    /// ignoring the requested commit. `committed_at` defaults to now if `None`.
    #[must_use]
    pub fn with_commit(
        mut self,
        commit_sha: impl Into<String>,
        branch: impl Into<String>,
        committed_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.fixed_commit = Some((commit_sha.into(), branch.into(), committed_at));
        self
    }
}

#[async_trait]
impl SourceAcquirer for MockSourceAcquirer {
    async fn clone(
        &self,
        url: &str,
        commit_sha: Option<&str>,
        _token: Option<&str>,
    ) -> SourceResult<Box<dyn Source>> {
        if self.fail_urls.iter().any(|u| u == url) {
            return Err(SourceError::CloneFailed {
                url: url.to_string(),
                message: "mock configured to fail this url".to_string(),
            });
        }

        if let Some((fixed_sha, fixed_branch, committed_at)) = &self.fixed_commit {
            return Ok(Box::new(MockSource {
                root_path: PathBuf::from("/tmp/mock-source"),
                branch: fixed_branch.clone(),
                commit_sha: fixed_sha.clone(),
                committed_at: committed_at.or(Some(Utc::now())),
            }));
        }

        Ok(Box::new(MockSource {
            root_path: PathBuf::from("/tmp/mock-source"),
            branch: "main".to_string(),
            commit_sha: commit_sha.unwrap_or("0000000000000000000000000000000000000").to_string(),
            committed_at: Some(Utc::now()),
        }))
    }
}

pub struct MockSource {
    root_path: PathBuf,
    branch: String,
    commit_sha: String,
    committed_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl Source for MockSource {
    fn branch(&self) -> &str {
        &self.branch
    }

    fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.committed_at
    }

    fn root_path(&self) -> &Path {
        &self.root_path
    }

    async fn verify_commit_exists(&self, sha: &str) -> SourceResult<bool> {
        Ok(sha == self.commit_sha)
    }

    async fn close(self: Box<Self>) -> SourceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_succeeds_by_default() {
        let acquirer = MockSourceAcquirer::new();
        let source = acquirer.clone("https://example.com/repo.git", Some("abc123"), None).await.unwrap();
        assert_eq!(source.commit_sha(), "abc123");
    }

    #[tokio::test]
    async fn test_clone_fails_for_configured_url() {
        let acquirer = MockSourceAcquirer::new().failing_on("https://example.com/bad.git");
        let result = acquirer.clone("https://example.com/bad.git", None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fixed_commit_ignores_requested_commit() {
        let acquirer = MockSourceAcquirer::new().with_commit("dupe-sha", "main", None);
        let source = acquirer.clone("https://example.com/repo.git", Some("requested-sha"), None).await.unwrap();
        assert_eq!(source.commit_sha(), "dupe-sha");
        assert_eq!(source.branch(), "main");
    }
}
