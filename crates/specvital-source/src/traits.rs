//! The source acquisition capability

use crate::error::SourceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// A cloned working copy, exclusively owned by one orchestrator execution.
///
/// Never shared between concurrent jobs; `close` must run on every exit
/// path, including error paths, to remove the on-disk directory.
#[async_trait]
pub trait Source: Send + Sync {
    fn branch(&self) -> &str;
    fn commit_sha(&self) -> &str;
    fn committed_at(&self) -> Option<DateTime<Utc>>;

    /// Root of the working copy, for the parser adapter to scan.
    fn root_path(&self) -> &Path;

    async fn verify_commit_exists(&self, sha: &str) -> SourceResult<bool>;

    /// Remove the working copy and any caches. Idempotent.
    async fn close(self: Box<Self>) -> SourceResult<()>;
}

/// Clones a remote repository into a scratch working copy.
///
/// Concurrency control is deliberately not performed here — bounding how
/// many clones run at once is a caller policy (see the analyze
/// orchestrator), not a source-acquisition concern.
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    /// Clone `url` at `commit_sha`, or the default branch head if
    /// `commit_sha` is `None`. `token`, when present, is attached as HTTP
    /// basic credentials on the clone transport.
    async fn clone(
        &self,
        url: &str,
        commit_sha: Option<&str>,
        token: Option<&str>,
    ) -> SourceResult<Box<dyn Source>>;
}
