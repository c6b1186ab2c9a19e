//! Run inventory schema migrations against `SPECVITAL_DATABASE_*`
//!
//! Usage: cargo run --example run_migrations

use specvital_config::DatabaseConfig;
use specvital_inventory::run_migrations;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DatabaseConfig::from_env();
    println!("Setting up database at: {}", config.safe_connection_string());

    let pool = config.create_write_pool().await?;
    run_migrations(&pool).await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = 'public'
         ORDER BY table_name",
    )
    .fetch_all(&pool)
    .await?;

    println!("\nCreated tables:");
    for table in tables {
        println!("  - {table}");
    }

    Ok(())
}
