//! In-memory `InventoryStore` for unit testing callers of this crate

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{InventoryError, InventoryOperation, InventoryResult};
use crate::models::{Analysis, Codebase, CreateAnalysisParams, RefreshCandidate};
use crate::traits::InventoryStore;
use specvital_parser::models::Inventory;

#[derive(Default)]
struct State {
    codebases: HashMap<(String, String, String), Codebase>,
    analyses: HashMap<Uuid, Analysis>,
}

/// Mirrors `PostgresInventoryStore`'s externally-visible state machine
/// without a database, including the `(codebase_id, commit_sha)`
/// completed-analysis dedup that the unique partial index enforces in
/// production.
#[derive(Clone)]
pub struct MockInventoryStore {
    state: Arc<Mutex<State>>,
}

impl MockInventoryStore {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(State::default())) }
    }

    /// Snapshot of all analyses, for test assertions.
    pub fn analyses(&self) -> Vec<Analysis> {
        #[allow(clippy::unwrap_used)]
        self.state.lock().unwrap().analyses.values().cloned().collect()
    }
}

impl Default for MockInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for MockInventoryStore {
    async fn create_analysis_record(&self, params: CreateAnalysisParams) -> InventoryResult<Uuid> {
        if params.analysis_id.is_some_and(|id| id.is_nil()) {
            return Err(InventoryError::UnexpectedState {
                operation: Box::new(InventoryOperation::CreateAnalysisRecord {
                    owner: params.owner.clone(),
                    repo: params.repo.clone(),
                    commit_sha: params.commit_sha.clone(),
                }),
                message: "analysis_id must not be the nil UUID".to_string(),
            });
        }

        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();

        let key = (params.host.clone(), params.owner.clone(), params.repo.clone());
        let codebase_id = if let Some(existing) = state.codebases.get(&key) {
            existing.id
        } else {
            let id = Uuid::new_v4();
            state.codebases.insert(
                key,
                Codebase {
                    id,
                    host: params.host.clone(),
                    external_repo_id: format!("{}/{}", params.owner, params.repo),
                    owner: params.owner.clone(),
                    name: params.repo.clone(),
                    default_branch: params.branch.clone(),
                    is_private: false,
                    is_stale: false,
                    last_viewed_at: Utc::now(),
                },
            );
            id
        };

        let analysis_id = params.analysis_id.unwrap_or_else(Uuid::new_v4);
        state.analyses.insert(
            analysis_id,
            Analysis {
                id: analysis_id,
                codebase_id,
                commit_sha: params.commit_sha,
                branch_name: params.branch,
                status: "running".to_string(),
                started_at: Utc::now(),
                completed_at: None,
                committed_at: None,
                error_message: None,
                total_suites: 0,
                total_tests: 0,
                parser_version: params.parser_version,
            },
        );

        Ok(analysis_id)
    }

    async fn save_analysis_inventory(
        &self,
        analysis_id: Uuid,
        committed_at: Option<DateTime<Utc>>,
        inventory: &Inventory,
        _user_id: Option<Uuid>,
    ) -> InventoryResult<()> {
        let operation = InventoryOperation::SaveAnalysisInventory { analysis_id };

        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();

        let analysis = state
            .analyses
            .get(&analysis_id)
            .cloned()
            .ok_or(InventoryError::AnalysisNotFound { analysis_id, operation: Box::new(operation.clone()) })?;

        let already_completed = state.analyses.values().any(|a| {
            a.id != analysis_id
                && a.codebase_id == analysis.codebase_id
                && a.commit_sha == analysis.commit_sha
                && a.status == "completed"
        });
        if already_completed {
            return Err(InventoryError::AlreadyCompleted { operation: Box::new(operation) });
        }

        #[allow(clippy::unwrap_used)]
        let entry = state.analyses.get_mut(&analysis_id).unwrap();
        entry.status = "completed".to_string();
        entry.completed_at = Some(Utc::now());
        entry.committed_at = committed_at;
        entry.total_suites = i32::try_from(inventory.total_suites()).unwrap_or(i32::MAX);
        entry.total_tests = i32::try_from(inventory.total_tests()).unwrap_or(i32::MAX);

        Ok(())
    }

    async fn record_failure(&self, analysis_id: Uuid, message: &str) -> InventoryResult<()> {
        let operation = InventoryOperation::RecordFailure { analysis_id };

        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();
        let entry = state
            .analyses
            .get_mut(&analysis_id)
            .ok_or(InventoryError::AnalysisNotFound { analysis_id, operation: Box::new(operation) })?;

        entry.status = "failed".to_string();
        entry.completed_at = Some(Utc::now());
        entry.error_message = Some(message.to_string());
        Ok(())
    }

    async fn list_refresh_candidates(&self, _viewed_within_days: i64) -> InventoryResult<Vec<RefreshCandidate>> {
        #[allow(clippy::unwrap_used)]
        let state = self.state.lock().unwrap();

        let candidates = state
            .codebases
            .values()
            .filter(|c| !c.is_stale && !c.is_private)
            .map(|c| {
                let last = state
                    .analyses
                    .values()
                    .filter(|a| a.codebase_id == c.id && a.status == "completed")
                    .max_by_key(|a| a.completed_at);

                let consecutive_failures = state
                    .analyses
                    .values()
                    .filter(|a| {
                        a.codebase_id == c.id
                            && a.status == "failed"
                            && last.is_none_or(|l| a.started_at > l.started_at)
                    })
                    .count() as i64;

                RefreshCandidate {
                    codebase_id: c.id,
                    host: c.host.clone(),
                    owner: c.owner.clone(),
                    name: c.name.clone(),
                    last_viewed_at: c.last_viewed_at,
                    last_completed_at: last.and_then(|a| a.completed_at),
                    last_commit_sha: last.map(|a| a.commit_sha.clone()),
                    last_parser_version: last.map(|a| a.parser_version.clone()),
                    consecutive_failures,
                }
            })
            .collect();

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(commit: &str) -> CreateAnalysisParams {
        CreateAnalysisParams {
            host: "github.com".to_string(),
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            branch: "main".to_string(),
            commit_sha: commit.to_string(),
            parser_version: "1.0.0".to_string(),
            analysis_id: None,
        }
    }

    #[tokio::test]
    async fn test_rejects_nil_analysis_id() {
        let store = MockInventoryStore::new();
        let mut p = params("abc123");
        p.analysis_id = Some(Uuid::nil());
        let result = store.create_analysis_record(p).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_rejected() {
        let store = MockInventoryStore::new();
        let inventory = Inventory::default();

        let first = store.create_analysis_record(params("abc123")).await.unwrap();
        store.save_analysis_inventory(first, None, &inventory, None).await.unwrap();

        let second = store.create_analysis_record(params("abc123")).await.unwrap();
        let result = store.save_analysis_inventory(second, None, &inventory, None).await;
        assert!(matches!(result, Err(InventoryError::AlreadyCompleted { .. })));
    }

    #[tokio::test]
    async fn test_record_failure_requires_existing_analysis() {
        let store = MockInventoryStore::new();
        let result = store.record_failure(Uuid::new_v4(), "boom").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refresh_candidates_counts_consecutive_failures() {
        let store = MockInventoryStore::new();
        let inventory = Inventory::default();

        let completed = store.create_analysis_record(params("v1")).await.unwrap();
        store.save_analysis_inventory(completed, None, &inventory, None).await.unwrap();

        let failed_one = store.create_analysis_record(params("v2")).await.unwrap();
        store.record_failure(failed_one, "parse error").await.unwrap();
        let failed_two = store.create_analysis_record(params("v3")).await.unwrap();
        store.record_failure(failed_two, "parse error").await.unwrap();

        let candidates = store.list_refresh_candidates(30).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].consecutive_failures, 2);
    }
}
