//! Schema migration runner, guarded by a `PostgreSQL` advisory lock so
//! multiple worker processes starting concurrently don't race to apply it.

use crate::error::{QueueError, QueueOperation, QueueResult};
use sqlx::{PgPool, Row};

const MIGRATION_LOCK_ID: i64 = 7_301_001;

/// Apply all pending migrations for the `jobs` table.
///
/// # Errors
/// Returns `QueueError` if the advisory lock cannot be acquired/released, or
/// if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> QueueResult<()> {
    let lock_op = QueueOperation::Query {
        description: "acquire migration lock".to_string(),
    };

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await
        .map_err(|e| QueueError::from_sqlx(lock_op, e))?;

    let result = run_migrations_inner(pool).await;

    let unlock_op = QueueOperation::Query {
        description: "release migration lock".to_string(),
    };
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await
        .map_err(|e| QueueError::from_sqlx(unlock_op, e))?;

    result
}

async fn run_migrations_inner(pool: &PgPool) -> QueueResult<()> {
    let schema_op = QueueOperation::Query {
        description: "create schema_migrations table".to_string(),
    };

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMPTZ DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| QueueError::from_sqlx(schema_op.clone(), e))?;

    let applied: Vec<i32> = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| QueueError::from_sqlx(schema_op, e))?
        .iter()
        .map(|row| row.get(0))
        .collect();

    let migrations: Vec<(i32, &str, &str)> = vec![(
        1,
        "create_jobs",
        include_str!("../migrations/001_create_jobs.sql"),
    )];

    for (version, name, sql) in migrations {
        if applied.contains(&version) {
            tracing::debug!(version, name, "migration already applied");
            continue;
        }

        tracing::info!(version, name, "applying migration");
        let apply_op = QueueOperation::Query {
            description: format!("apply migration {version} ({name})"),
        };

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| QueueError::from_sqlx(apply_op.clone(), e))?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::from_sqlx(apply_op.clone(), e))?;

        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(version)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::from_sqlx(apply_op.clone(), e))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::from_sqlx(apply_op, e))?;

        tracing::info!(version, name, "migration applied");
    }

    Ok(())
}
