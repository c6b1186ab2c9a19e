//! The analyze orchestrator: clones a repository, scans it with the parser
//! adapter, and persists the resulting inventory.
//!
//! Composes five capabilities (`SourceAcquirer`, `ParserAdapter`,
//! `InventoryStore`, and optionally `CredentialStore`) behind a single
//! `analyze` entry point. None of those capabilities know about each other;
//! this module owns the sequencing and error translation between them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use uuid::Uuid;

use specvital_credentials::{CredentialStore, CredentialsError};
use specvital_inventory::{CreateAnalysisParams, InventoryError, InventoryStore};
use specvital_parser::ParserAdapter;
use specvital_source::{Source, SourceAcquirer};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::validation::validate_owner_repo;

/// Credential provider name used for the git host token lookup.
const GIT_PROVIDER: &str = "github";

/// Per-job deadline for an `analyze` run: clone + scan + save.
pub const ANALYZE_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One analyze request, as carried by the `analysis` job payload.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub owner: String,
    pub repo: String,
    /// Pinned commit to analyze. `None` resolves to the default branch head.
    pub commit_sha: Option<String>,
    /// The user whose credential should be used for a private clone, if any.
    pub user_id: Option<Uuid>,
}

/// Orchestrates one `analyze` job from request to persisted inventory.
///
/// Cheap to clone: every field is an `Arc` (or a `Semaphore` behind one), so
/// cloning shares the same clone-concurrency budget and capability instances
/// across concurrently dispatched jobs.
#[derive(Clone)]
pub struct AnalyzeOrchestrator {
    source: Arc<dyn SourceAcquirer>,
    parser: Arc<dyn ParserAdapter>,
    inventory: Arc<dyn InventoryStore>,
    credentials: Option<Arc<dyn CredentialStore>>,
    clone_semaphore: Arc<Semaphore>,
    host: String,
    parser_version: String,
}

impl AnalyzeOrchestrator {
    pub fn new(
        source: Arc<dyn SourceAcquirer>,
        parser: Arc<dyn ParserAdapter>,
        inventory: Arc<dyn InventoryStore>,
        credentials: Option<Arc<dyn CredentialStore>>,
        concurrency_limit: usize,
        host: impl Into<String>,
        parser_version: impl Into<String>,
    ) -> Self {
        Self {
            source,
            parser,
            inventory,
            credentials,
            clone_semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            host: host.into(),
            parser_version: parser_version.into(),
        }
    }

    /// Run `analyze` under [`ANALYZE_JOB_TIMEOUT`], translating an elapsed
    /// deadline into [`OrchestratorError::DeadlineExceeded`].
    #[tracing::instrument(skip(self, request), fields(owner = %request.owner, repo = %request.repo))]
    pub async fn analyze_with_timeout(&self, request: AnalyzeRequest) -> OrchestratorResult<Uuid> {
        match tokio::time::timeout(ANALYZE_JOB_TIMEOUT, self.analyze(request)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::DeadlineExceeded(ANALYZE_JOB_TIMEOUT)),
        }
    }

    /// Clone, scan, and persist one repository at one commit.
    ///
    /// 1. Validate `owner`/`repo`.
    /// 2. Look up a credential for `user_id`, if given; a missing credential
    ///    falls back to an unauthenticated clone, a lookup failure does not.
    /// 3. Clone under the bounded semaphore; the permit is released as soon
    ///    as the clone returns, not held across the scan.
    /// 4. Resolve the commit to analyze: the request's pinned sha, or
    ///    whatever the clone checked out.
    /// 5. Create the `running` analysis record.
    /// 6. Scan the working copy.
    /// 7. Persist the inventory and mark the analysis `completed`.
    ///
    /// The working copy is always closed on the way out, independent of
    /// which step failed.
    #[tracing::instrument(skip(self, request), fields(owner = %request.owner, repo = %request.repo, commit = tracing::field::Empty, analysis_id = tracing::field::Empty))]
    pub async fn analyze(&self, request: AnalyzeRequest) -> OrchestratorResult<Uuid> {
        validate_owner_repo(&request.owner, &request.repo)?;

        let token = self.resolve_token(request.user_id).await?;
        let url = format!("https://{}/{}/{}.git", self.host, request.owner, request.repo);

        let permit = Arc::clone(&self.clone_semaphore)
            .acquire_owned()
            .await
            .expect("clone semaphore is never closed");

        let clone_result = self
            .source
            .clone(&url, request.commit_sha.as_deref(), token.as_deref())
            .await;
        drop(permit);

        let src = clone_result.map_err(|source| OrchestratorError::CloneFailed {
            owner: request.owner.clone(),
            repo: request.repo.clone(),
            source,
        })?;

        tracing::Span::current().record("commit", src.commit_sha());

        let outcome = self.run_after_clone(src.as_ref(), &request).await;

        if let Err(close_err) = src.close().await {
            tracing::warn!(error = %close_err, "failed to remove working copy");
        }

        outcome
    }

    async fn resolve_token(&self, user_id: Option<Uuid>) -> OrchestratorResult<Option<String>> {
        let (Some(user_id), Some(credentials)) = (user_id, self.credentials.as_ref()) else {
            return Ok(None);
        };

        match credentials.lookup(user_id, GIT_PROVIDER).await {
            Ok(token) => Ok(Some(token)),
            Err(CredentialsError::TokenNotFound { .. }) => {
                tracing::info!(%user_id, "no stored credential on file, falling back to an unauthenticated clone");
                Ok(None)
            }
            Err(source) => Err(OrchestratorError::TokenLookupFailed { user_id, source }),
        }
    }

    async fn run_after_clone(
        &self,
        src: &dyn Source,
        request: &AnalyzeRequest,
    ) -> OrchestratorResult<Uuid> {
        let commit_sha = request
            .commit_sha
            .clone()
            .filter(|sha| !sha.is_empty())
            .unwrap_or_else(|| src.commit_sha().to_string());

        let analysis_id = self
            .inventory
            .create_analysis_record(CreateAnalysisParams {
                host: self.host.clone(),
                owner: request.owner.clone(),
                repo: request.repo.clone(),
                branch: src.branch().to_string(),
                commit_sha,
                parser_version: self.parser_version.clone(),
                analysis_id: None,
            })
            .await
            .map_err(|source| OrchestratorError::RecordCreationFailed {
                owner: request.owner.clone(),
                repo: request.repo.clone(),
                source,
            })?;

        tracing::Span::current().record("analysis_id", analysis_id.to_string());

        let inventory = match self.parser.scan(src).await {
            Ok(inventory) => inventory,
            Err(source) => {
                self.best_effort_record_failure(analysis_id, &source.to_string())
                    .await;
                return Err(OrchestratorError::ScanFailed { analysis_id, source });
            }
        };

        match self
            .inventory
            .save_analysis_inventory(analysis_id, src.committed_at(), &inventory, request.user_id)
            .await
        {
            Ok(()) => Ok(analysis_id),
            Err(InventoryError::AlreadyCompleted { .. }) => {
                Err(OrchestratorError::AlreadyCompleted { analysis_id })
            }
            Err(source) => {
                self.best_effort_record_failure(analysis_id, &source.to_string())
                    .await;
                Err(OrchestratorError::SaveFailed { analysis_id, source })
            }
        }
    }

    /// Record a job's terminal failure without letting a failure here mask
    /// the error that triggered the call (§9: best-effort by design).
    async fn best_effort_record_failure(&self, analysis_id: Uuid, message: &str) {
        if let Err(record_err) = self.inventory.record_failure(analysis_id, message).await {
            tracing::warn!(%analysis_id, error = %record_err, "failed to record analysis failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specvital_credentials::MockCredentialStore;
    use specvital_inventory::MockInventoryStore;
    use specvital_parser::models::Inventory;
    use specvital_parser::MockParserAdapter;
    use specvital_source::MockSourceAcquirer;

    fn orchestrator(
        source: MockSourceAcquirer,
        parser: MockParserAdapter,
        inventory: MockInventoryStore,
        credentials: Option<MockCredentialStore>,
    ) -> AnalyzeOrchestrator {
        AnalyzeOrchestrator::new(
            Arc::new(source),
            Arc::new(parser),
            Arc::new(inventory),
            credentials.map(|c| Arc::new(c) as Arc<dyn CredentialStore>),
            2,
            "github.com",
            "test-parser-1",
        )
    }

    #[tokio::test]
    async fn test_rejects_invalid_owner_before_touching_any_capability() {
        let orchestrator = orchestrator(
            MockSourceAcquirer::new(),
            MockParserAdapter::new(Inventory::default()),
            MockInventoryStore::new(),
            None,
        );

        let err = orchestrator
            .analyze(AnalyzeRequest {
                owner: "evil.com/repo".to_string(),
                repo: "x".to_string(),
                commit_sha: None,
                user_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidInput { .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_happy_path_clones_scans_and_saves() {
        let orchestrator = orchestrator(
            MockSourceAcquirer::new(),
            MockParserAdapter::new(Inventory::default()),
            MockInventoryStore::new(),
            None,
        );

        let analysis_id = orchestrator
            .analyze(AnalyzeRequest {
                owner: "octocat".to_string(),
                repo: "Hello-World".to_string(),
                commit_sha: Some("abc123".to_string()),
                user_id: None,
            })
            .await
            .unwrap();

        assert!(!analysis_id.is_nil());
    }

    #[tokio::test]
    async fn test_missing_credential_falls_back_to_unauthenticated_clone() {
        let user_id = Uuid::new_v4();
        let orchestrator = orchestrator(
            MockSourceAcquirer::new(),
            MockParserAdapter::new(Inventory::default()),
            MockInventoryStore::new(),
            Some(MockCredentialStore::new()),
        );

        let result = orchestrator
            .analyze(AnalyzeRequest {
                owner: "octocat".to_string(),
                repo: "Hello-World".to_string(),
                commit_sha: None,
                user_id: Some(user_id),
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_credential_lookup_failure_is_transient_and_aborts_before_clone() {
        let user_id = Uuid::new_v4();
        let orchestrator = orchestrator(
            MockSourceAcquirer::new(),
            MockParserAdapter::new(Inventory::default()),
            MockInventoryStore::new(),
            Some(MockCredentialStore::new().failing_lookup_for(user_id, GIT_PROVIDER)),
        );

        let err = orchestrator
            .analyze(AnalyzeRequest {
                owner: "octocat".to_string(),
                repo: "Hello-World".to_string(),
                commit_sha: None,
                user_id: Some(user_id),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::TokenLookupFailed { .. }));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn test_scan_failure_records_failure_and_wraps_scan_failed() {
        let inventory = MockInventoryStore::new();
        let orchestrator = orchestrator(
            MockSourceAcquirer::new(),
            MockParserAdapter::new(Inventory::default()).failing(),
            inventory.clone(),
            None,
        );

        let err = orchestrator
            .analyze(AnalyzeRequest {
                owner: "octocat".to_string(),
                repo: "Hello-World".to_string(),
                commit_sha: None,
                user_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ScanFailed { .. }));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_permanent() {
        let orchestrator = orchestrator(
            MockSourceAcquirer::new().with_commit("dupe-sha", "main", None),
            MockParserAdapter::new(Inventory::default()),
            MockInventoryStore::new(),
            None,
        );

        let request = AnalyzeRequest {
            owner: "octocat".to_string(),
            repo: "Hello-World".to_string(),
            commit_sha: Some("dupe-sha".to_string()),
            user_id: None,
        };

        orchestrator.analyze(request.clone()).await.unwrap();
        let err = orchestrator.analyze(request).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::AlreadyCompleted { .. }));
        assert!(err.is_permanent());
    }
}
