//! `PostgreSQL` implementation of inventory persistence.
//!
//! Suites are inserted depth-by-depth via `UNNEST`, root first, so a
//! child's `parent_id` foreign key always points at an already-committed
//! row (§4.6). Leaf test cases are streamed in a single `COPY` once every
//! suite for the analysis has an id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{InventoryError, InventoryErrorExt, InventoryOperation, InventoryResult};
use crate::models::{
    CreateAnalysisParams, RefreshCandidate, TestCaseStatus, ERROR_MESSAGE_MAX_BYTES,
    TEST_CASE_NAME_MAX_BYTES, TEST_SUITE_NAME_MAX_BYTES, truncate_utf8,
};
use crate::pool_manager::PoolManager;
use crate::traits::InventoryStore;
use specvital_parser::models::{Inventory, ParsedSuite, ParsedTest, TestStatus};

/// Repository for inventory persistence with write/read pool separation.
pub struct PostgresInventoryStore {
    pools: PoolManager,
}

impl PostgresInventoryStore {
    pub const fn new(pools: PoolManager) -> Self {
        Self { pools }
    }
}

/// A flattened suite row, pre-assigned a real id so children can reference
/// it as `parent_id` before the parent batch is committed.
struct SuiteRow {
    id: Uuid,
    file_id: Uuid,
    parent_id: Option<Uuid>,
    name: String,
    line_number: Option<i32>,
    depth: i32,
}

/// A flattened test-case row, addressed at its owning suite by the suite's
/// pre-assigned id.
struct CaseRow {
    id: Uuid,
    suite_id: Uuid,
    name: String,
    line_number: Option<i32>,
    status: TestCaseStatus,
    tags: Vec<String>,
    modifier: Option<String>,
}

fn map_status(status: TestStatus) -> TestCaseStatus {
    match status {
        TestStatus::Active => TestCaseStatus::Active,
        TestStatus::Skipped => TestCaseStatus::Skipped,
        TestStatus::Todo => TestCaseStatus::Todo,
        TestStatus::Focused => TestCaseStatus::Focused,
        TestStatus::Xfail => TestCaseStatus::Xfail,
    }
}

fn case_row(suite_id: Uuid, test: &ParsedTest) -> CaseRow {
    CaseRow {
        id: Uuid::new_v4(),
        suite_id,
        name: truncate_utf8(&test.name, TEST_CASE_NAME_MAX_BYTES),
        line_number: test.line_number.and_then(|n| i32::try_from(n).ok()),
        status: map_status(test.status),
        tags: test.tags.clone(),
        modifier: test.modifier.clone(),
    }
}

fn push_at_depth(by_depth: &mut Vec<Vec<SuiteRow>>, depth: usize, row: SuiteRow) {
    if by_depth.len() <= depth {
        by_depth.resize_with(depth + 1, Vec::new);
    }
    by_depth[depth].push(row);
}

/// Walk a suite tree, assigning a real id to every node and bucketing rows
/// by depth so they can be inserted root-first.
fn flatten_suite(
    suite: &ParsedSuite,
    file_id: Uuid,
    parent_id: Option<Uuid>,
    depth: usize,
    by_depth: &mut Vec<Vec<SuiteRow>>,
    cases: &mut Vec<CaseRow>,
) {
    let suite_id = Uuid::new_v4();
    push_at_depth(
        by_depth,
        depth,
        SuiteRow {
            id: suite_id,
            file_id,
            parent_id,
            name: truncate_utf8(&suite.name, TEST_SUITE_NAME_MAX_BYTES),
            line_number: suite.line_number.and_then(|n| i32::try_from(n).ok()),
            depth: depth as i32,
        },
    );

    for test in &suite.tests {
        cases.push(case_row(suite_id, test));
    }
    for child in &suite.suites {
        flatten_suite(child, file_id, Some(suite_id), depth + 1, by_depth, cases);
    }
}

async fn upsert_codebase(
    tx: &mut Transaction<'_, Postgres>,
    host: &str,
    owner: &str,
    repo: &str,
    branch: &str,
) -> InventoryResult<Uuid> {
    let operation = InventoryOperation::UpsertCodebase {
        host: host.to_string(),
        owner: owner.to_string(),
        name: repo.to_string(),
    };

    // There is no repository-identity API in scope here (that lives behind
    // the host's own REST/GraphQL surface), so `external_repo_id` is
    // synthesized from `(owner, repo)`. A real rename-tracking identity
    // resolver would need to supply this instead; see DESIGN.md.
    let external_repo_id = format!("{owner}/{repo}");

    sqlx::query_scalar(
        r"
        INSERT INTO codebases (host, external_repo_id, owner, name, default_branch, last_viewed_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (host, external_repo_id) DO UPDATE SET
            owner = EXCLUDED.owner,
            name = EXCLUDED.name,
            default_branch = EXCLUDED.default_branch,
            last_viewed_at = NOW(),
            is_stale = FALSE
        RETURNING id
        ",
    )
    .bind(host)
    .bind(&external_repo_id)
    .bind(owner)
    .bind(repo)
    .bind(branch)
    .fetch_one(&mut **tx)
    .await
    .map_inventory_err(operation)
}

async fn insert_suite_batch(
    tx: &mut Transaction<'_, Postgres>,
    analysis_id: Uuid,
    depth: i32,
    batch: &[SuiteRow],
) -> InventoryResult<()> {
    let operation = InventoryOperation::InsertSuites {
        analysis_id,
        depth: u32::try_from(depth).unwrap_or(0),
        count: batch.len(),
    };

    let ids: Vec<Uuid> = batch.iter().map(|s| s.id).collect();
    let file_ids: Vec<Uuid> = batch.iter().map(|s| s.file_id).collect();
    let parent_ids: Vec<Option<Uuid>> = batch.iter().map(|s| s.parent_id).collect();
    let names: Vec<String> = batch.iter().map(|s| s.name.clone()).collect();
    let line_numbers: Vec<Option<i32>> = batch.iter().map(|s| s.line_number).collect();
    let depths: Vec<i32> = batch.iter().map(|s| s.depth).collect();

    sqlx::query(
        r"
        INSERT INTO test_suites (id, file_id, parent_id, name, line_number, depth)
        SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::varchar[], $5::int[], $6::int[])
        ",
    )
    .bind(&ids)
    .bind(&file_ids)
    .bind(&parent_ids)
    .bind(&names)
    .bind(&line_numbers)
    .bind(&depths)
    .execute(&mut **tx)
    .await
    .map_inventory_err(operation)?;

    Ok(())
}

/// Write one CSV field into `buf`, quoting it whenever it contains a
/// comma, quote, or line break, or is itself empty (an unquoted empty
/// field is the `COPY ... FORMAT csv` spelling of `NULL`, so an actual
/// empty string must be quoted to be distinguishable from it).
fn write_csv_field(buf: &mut Vec<u8>, field: Option<&str>) {
    let Some(s) = field else { return };
    let needs_quoting = s.is_empty() || s.contains(['"', ',', '\n', '\r']);
    if !needs_quoting {
        buf.extend_from_slice(s.as_bytes());
        return;
    }
    buf.push(b'"');
    for ch in s.chars() {
        if ch == '"' {
            buf.push(b'"');
        }
        let mut tmp = [0u8; 4];
        buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
    }
    buf.push(b'"');
}

/// Render a Postgres `text[]` literal (e.g. `{a,b}`), quoting every
/// element so values containing commas, braces, or quotes round-trip.
fn pg_text_array(values: &[String]) -> String {
    let mut out = String::from("{");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        for ch in v.chars() {
            if ch == '"' || ch == '\\' {
                out.push('\\');
            }
            out.push(ch);
        }
        out.push('"');
    }
    out.push('}');
    out
}

async fn copy_test_cases(
    tx: &mut Transaction<'_, Postgres>,
    analysis_id: Uuid,
    cases: &[CaseRow],
) -> InventoryResult<()> {
    let operation = InventoryOperation::InsertTestCases { analysis_id, count: cases.len() };

    let mut buf = Vec::new();
    for case in cases {
        let id = case.id.to_string();
        let suite_id = case.suite_id.to_string();
        let status = case.status.to_string();
        let line_number = case.line_number.map(|n| n.to_string());
        let tags = pg_text_array(&case.tags);
        let fields: [Option<&str>; 7] = [
            Some(id.as_str()),
            Some(suite_id.as_str()),
            Some(case.name.as_str()),
            line_number.as_deref(),
            Some(status.as_str()),
            Some(tags.as_str()),
            case.modifier.as_deref(),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                buf.push(b',');
            }
            write_csv_field(&mut buf, *field);
        }
        buf.push(b'\n');
    }

    let copy_sql =
        "COPY test_cases (id, suite_id, name, line_number, status, tags, modifier) FROM STDIN WITH (FORMAT csv)";

    let mut copy_in = tx.copy_in_raw(copy_sql).await.map_err(|e| InventoryError::CopyFailed {
        operation: Box::new(operation.clone()),
        message: e.to_string(),
        source: e,
    })?;

    copy_in.send(buf.as_slice()).await.map_err(|e| InventoryError::CopyFailed {
        operation: Box::new(operation.clone()),
        message: e.to_string(),
        source: e,
    })?;

    copy_in.finish().await.map_err(|e| InventoryError::CopyFailed {
        operation: Box::new(operation),
        message: e.to_string(),
        source: e,
    })?;

    Ok(())
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[tracing::instrument(skip(self, params), fields(owner = %params.owner, repo = %params.repo, elapsed_ms))]
    async fn create_analysis_record(&self, params: CreateAnalysisParams) -> InventoryResult<Uuid> {
        let start = std::time::Instant::now();

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

        let operation = InventoryOperation::CreateAnalysisRecord {
            owner: params.owner.clone(),
            repo: params.repo.clone(),
            commit_sha: params.commit_sha.clone(),
        };

        let mut tx = self.pools.write_pool().begin().await.map_inventory_err(operation.clone())?;

        let codebase_id =
            upsert_codebase(&mut tx, &params.host, &params.owner, &params.repo, &params.branch)
                .await?;

        let analysis_id = params.analysis_id.unwrap_or_else(Uuid::new_v4);

        sqlx::query(
            r"
            INSERT INTO analyses (id, codebase_id, commit_sha, branch_name, status, parser_version)
            VALUES ($1, $2, $3, $4, 'running', $5)
            ",
        )
        .bind(analysis_id)
        .bind(codebase_id)
        .bind(&params.commit_sha)
        .bind(&params.branch)
        .bind(&params.parser_version)
        .execute(&mut *tx)
        .await
        .map_inventory_err(operation.clone())?;

        tx.commit().await.map_inventory_err(operation)?;

        tracing::Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
        Ok(analysis_id)
    }

    #[tracing::instrument(skip(self, inventory), fields(%analysis_id, elapsed_ms))]
    async fn save_analysis_inventory(
        &self,
        analysis_id: Uuid,
        committed_at: Option<DateTime<Utc>>,
        inventory: &Inventory,
        user_id: Option<Uuid>,
    ) -> InventoryResult<()> {
        let start = std::time::Instant::now();
        let operation = InventoryOperation::SaveAnalysisInventory { analysis_id };

        let mut tx = self.pools.write_pool().begin().await.map_inventory_err(operation.clone())?;

        let mut file_ids = Vec::with_capacity(inventory.files.len());
        for file in &inventory.files {
            let file_id = Uuid::new_v4();
            let framework = (!file.framework.trim().is_empty()).then_some(file.framework.as_str());

            sqlx::query(
                "INSERT INTO test_files (id, analysis_id, path, framework, domain_hints) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(file_id)
            .bind(analysis_id)
            .bind(&file.path)
            .bind(framework)
            .bind(&file.domain_hints)
            .execute(&mut *tx)
            .await
            .map_inventory_err(operation.clone())?;

            file_ids.push(file_id);
        }

        let mut suites_by_depth: Vec<Vec<SuiteRow>> = Vec::new();
        let mut cases: Vec<CaseRow> = Vec::new();

        for (file, &file_id) in inventory.files.iter().zip(file_ids.iter()) {
            for suite in &file.suites {
                flatten_suite(suite, file_id, None, 0, &mut suites_by_depth, &mut cases);
            }

            if !file.tests.is_empty() {
                let synthetic_id = Uuid::new_v4();
                push_at_depth(
                    &mut suites_by_depth,
                    0,
                    SuiteRow {
                        id: synthetic_id,
                        file_id,
                        parent_id: None,
                        name: truncate_utf8(&file.path, TEST_SUITE_NAME_MAX_BYTES),
                        line_number: None,
                        depth: 0,
                    },
                );
                for test in &file.tests {
                    cases.push(case_row(synthetic_id, test));
                }
            }
        }

        let total_suites = suites_by_depth.iter().map(Vec::len).sum::<usize>();

        let mut inserted_suite_ids: HashSet<Uuid> = HashSet::with_capacity(total_suites);
        for (depth, batch) in suites_by_depth.iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            insert_suite_batch(&mut tx, analysis_id, depth as i32, batch).await?;
            inserted_suite_ids.extend(batch.iter().map(|s| s.id));
        }

        for case in &cases {
            if !inserted_suite_ids.contains(&case.suite_id) {
                return Err(InventoryError::MissingSuiteMapping {
                    temp_id: case.suite_id.to_string(),
                    operation: Box::new(operation),
                });
            }
        }

        if !cases.is_empty() {
            copy_test_cases(&mut tx, analysis_id, &cases).await?;
        }

        let total_tests = i32::try_from(cases.len()).unwrap_or(i32::MAX);
        let total_suites = i32::try_from(total_suites).unwrap_or(i32::MAX);

        sqlx::query(
            r"
            UPDATE analyses
            SET status = 'completed', completed_at = NOW(), committed_at = $2,
                total_suites = $3, total_tests = $4
            WHERE id = $1
            ",
        )
        .bind(analysis_id)
        .bind(committed_at)
        .bind(total_suites)
        .bind(total_tests)
        .execute(&mut *tx)
        .await
        .map_inventory_err(operation.clone())?;

        if let Some(uid) = user_id {
            sqlx::query(
                "INSERT INTO user_analysis_history (user_id, analysis_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(uid)
            .bind(analysis_id)
            .execute(&mut *tx)
            .await
            .map_inventory_err(operation.clone())?;
        }

        tx.commit().await.map_inventory_err(operation)?;

        tracing::Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    #[tracing::instrument(skip(self, message), fields(%analysis_id))]
    async fn record_failure(&self, analysis_id: Uuid, message: &str) -> InventoryResult<()> {
        let operation = InventoryOperation::RecordFailure { analysis_id };
        let truncated = truncate_utf8(message, ERROR_MESSAGE_MAX_BYTES);

        let result = sqlx::query(
            r"
            UPDATE analyses
            SET status = 'failed', completed_at = NOW(), error_message = $2
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            ",
        )
        .bind(analysis_id)
        .bind(&truncated)
        .execute(self.pools.write_pool())
        .await
        .map_inventory_err(operation.clone())?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::AnalysisNotFound {
                analysis_id,
                operation: Box::new(operation),
            });
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_refresh_candidates(
        &self,
        viewed_within_days: i64,
    ) -> InventoryResult<Vec<RefreshCandidate>> {
        let operation = InventoryOperation::ListRefreshCandidates;

        sqlx::query_as::<_, RefreshCandidate>(
            r"
            WITH last_completed AS (
                SELECT DISTINCT ON (codebase_id)
                    codebase_id, commit_sha, parser_version, completed_at
                FROM analyses
                WHERE status = 'completed'
                ORDER BY codebase_id, completed_at DESC
            ),
            failures AS (
                SELECT a.codebase_id, COUNT(*) AS consecutive_failures
                FROM analyses a
                LEFT JOIN last_completed lc ON lc.codebase_id = a.codebase_id
                WHERE a.status = 'failed'
                  AND (lc.completed_at IS NULL OR a.started_at > lc.completed_at)
                GROUP BY a.codebase_id
            )
            SELECT
                c.id AS codebase_id,
                c.host,
                c.owner,
                c.name,
                c.last_viewed_at,
                lc.completed_at AS last_completed_at,
                lc.commit_sha AS last_commit_sha,
                lc.parser_version AS last_parser_version,
                COALESCE(f.consecutive_failures, 0) AS consecutive_failures
            FROM codebases c
            LEFT JOIN last_completed lc ON lc.codebase_id = c.id
            LEFT JOIN failures f ON f.codebase_id = c.id
            WHERE NOT c.is_stale
              AND NOT c.is_private
              AND c.last_viewed_at >= NOW() - make_interval(days => $1::int)
            ORDER BY c.last_viewed_at DESC
            ",
        )
        .bind(i32::try_from(viewed_within_days).unwrap_or(i32::MAX))
        .fetch_all(self.pools.read_pool())
        .await
        .map_inventory_err(operation)
    }
}

/// Build a `PostgresInventoryStore` from an already-open pool pair,
/// running pending migrations first.
///
/// # Errors
/// Returns an error if migrations fail to apply.
pub async fn connect(
    pools: PoolManager,
    migrate_pool: &PgPool,
) -> InventoryResult<PostgresInventoryStore> {
    crate::migrations::run_migrations(migrate_pool).await?;
    Ok(PostgresInventoryStore::new(pools))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_text_array_quotes_every_element() {
        assert_eq!(pg_text_array(&["slow".to_string(), "flaky".to_string()]), "{\"slow\",\"flaky\"}");
        assert_eq!(pg_text_array(&[]), "{}");
    }

    #[test]
    fn test_pg_text_array_escapes_quotes_and_backslashes() {
        assert_eq!(pg_text_array(&["a\"b\\c".to_string()]), "{\"a\\\"b\\\\c\"}");
    }

    #[test]
    fn test_write_csv_field_quotes_empty_string_but_not_null() {
        let mut buf = Vec::new();
        write_csv_field(&mut buf, None);
        assert_eq!(buf, b"");

        let mut buf = Vec::new();
        write_csv_field(&mut buf, Some(""));
        assert_eq!(buf, b"\"\"");
    }

    #[test]
    fn test_write_csv_field_quotes_on_comma_and_doubles_quotes() {
        let mut buf = Vec::new();
        write_csv_field(&mut buf, Some("has,comma"));
        assert_eq!(buf, b"\"has,comma\"");

        let mut buf = Vec::new();
        write_csv_field(&mut buf, Some("has \"quote\""));
        assert_eq!(buf, b"\"has \"\"quote\"\"\"");
    }

    #[test]
    fn test_flatten_suite_assigns_increasing_depth() {
        let file_id = Uuid::new_v4();
        let mut by_depth = Vec::new();
        let mut cases = Vec::new();

        let leaf = ParsedSuite {
            name: "#render".to_string(),
            line_number: Some(2),
            suites: vec![],
            tests: vec![ParsedTest {
                name: "renders".to_string(),
                line_number: Some(3),
                status: TestStatus::Active,
                tags: vec!["slow".to_string()],
                modifier: None,
            }],
        };
        let root = ParsedSuite {
            name: "Widget".to_string(),
            line_number: Some(1),
            suites: vec![leaf],
            tests: vec![],
        };

        flatten_suite(&root, file_id, None, 0, &mut by_depth, &mut cases);

        assert_eq!(by_depth.len(), 2);
        assert_eq!(by_depth[0].len(), 1);
        assert_eq!(by_depth[1].len(), 1);
        assert_eq!(by_depth[1][0].parent_id, Some(by_depth[0][0].id));
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].suite_id, by_depth[1][0].id);
    }
}
