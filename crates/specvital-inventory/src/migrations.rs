//! Schema migration runner, guarded by a `PostgreSQL` advisory lock so
//! multiple worker processes starting concurrently don't race to apply it.
//!
//! Tracks its own `inventory_schema_migrations` table, distinct from the
//! queue crate's `schema_migrations`, since the two are independently
//! versioned schemas that happen to share a physical database.

use crate::error::{InventoryError, InventoryOperation, InventoryResult};
use sqlx::{PgPool, Row};

const MIGRATION_LOCK_ID: i64 = 7_301_002;

/// Apply all pending migrations for the inventory schema.
///
/// # Errors
/// Returns `InventoryError` if the advisory lock cannot be acquired/released,
/// or if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> InventoryResult<()> {
    let lock_op = InventoryOperation::Query {
        description: "acquire migration lock".to_string(),
    };

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await
        .map_err(|e| InventoryError::from_sqlx(lock_op, e))?;

    let result = run_migrations_inner(pool).await;

    let unlock_op = InventoryOperation::Query {
        description: "release migration lock".to_string(),
    };
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await
        .map_err(|e| InventoryError::from_sqlx(unlock_op, e))?;

    result
}

async fn run_migrations_inner(pool: &PgPool) -> InventoryResult<()> {
    let schema_op = InventoryOperation::Query {
        description: "create inventory_schema_migrations table".to_string(),
    };

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS inventory_schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMPTZ DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| InventoryError::from_sqlx(schema_op.clone(), e))?;

    let applied: Vec<i32> =
        sqlx::query("SELECT version FROM inventory_schema_migrations ORDER BY version")
            .fetch_all(pool)
            .await
            .map_err(|e| InventoryError::from_sqlx(schema_op, e))?
            .iter()
            .map(|row| row.get(0))
            .collect();

    let migrations: Vec<(i32, &str, &str)> = vec![
        (1, "initial_schema", include_str!("../migrations/001_initial_schema.sql")),
        (2, "indexes", include_str!("../migrations/002_indexes.sql")),
    ];

    for (version, name, sql) in migrations {
        if applied.contains(&version) {
            tracing::debug!(version, name, "migration already applied");
            continue;
        }

        tracing::info!(version, name, "applying migration");
        let apply_op = InventoryOperation::Query {
            description: format!("apply migration {version} ({name})"),
        };

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| InventoryError::from_sqlx(apply_op.clone(), e))?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| InventoryError::from_sqlx(apply_op.clone(), e))?;

        sqlx::query("INSERT INTO inventory_schema_migrations (version, name) VALUES ($1, $2)")
            .bind(version)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| InventoryError::from_sqlx(apply_op.clone(), e))?;

        tx.commit()
            .await
            .map_err(|e| InventoryError::from_sqlx(apply_op, e))?;

        tracing::info!(version, name, "migration applied");
    }

    Ok(())
}

/// Poll until another process's migration run (holding the advisory lock)
/// completes, without running migrations itself.
///
/// # Errors
/// Returns an error if the lock check fails or `max_wait_secs` elapses
/// first.
pub async fn wait_for_migrations(pool: &PgPool, max_wait_secs: u64) -> InventoryResult<()> {
    let start = std::time::Instant::now();
    let max_duration = std::time::Duration::from_secs(max_wait_secs);

    loop {
        let op = InventoryOperation::Query {
            description: "check migration lock".to_string(),
        };

        let locked: Option<bool> = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .fetch_one(pool)
            .await
            .map_err(|e| InventoryError::from_sqlx(op.clone(), e))?;

        if locked == Some(true) {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(MIGRATION_LOCK_ID)
                .execute(pool)
                .await
                .map_err(|e| InventoryError::from_sqlx(op, e))?;
            return Ok(());
        }

        if start.elapsed() > max_duration {
            return Err(InventoryError::UnexpectedState {
                operation: Box::new(op),
                message: "timed out waiting for migrations to complete".to_string(),
            });
        }

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_migration_sql_embedded() {
        let sql1 = include_str!("../migrations/001_initial_schema.sql");
        assert!(sql1.contains("CREATE TABLE"));

        let sql2 = include_str!("../migrations/002_indexes.sql");
        assert!(sql2.contains("CREATE INDEX"));
    }
}
