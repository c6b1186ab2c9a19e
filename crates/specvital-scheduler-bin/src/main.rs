//! Refresh scheduler worker: on each tick, elects a single leader and
//! enqueues refresh analyses for codebases whose inventory has decayed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use specvital_config::validation::Validate;
use specvital_config::ApplicationConfig;
use specvital_inventory::PoolManager;
use specvital_lock::PostgresDistributedLock;
use specvital_queue::PostgresJobQueue;
use specvital_scheduler::RefreshScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    specvital_common::initialize_environment();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ApplicationConfig::from_env();
    config.validate()?;
    info!(database = %config.database.safe_connection_string(), "starting specvital refresh scheduler");

    let pools = PoolManager::new(&config.database).await?;
    let inventory = specvital_inventory::connect(pools.clone(), pools.write_pool()).await?;

    let queue_pool = config.database.create_write_pool().await?;
    specvital_queue::migrations::run_migrations(&queue_pool).await?;
    let queue = PostgresJobQueue::new(queue_pool, config.queue.initial_backoff_seconds);

    let lock_pool = config.database.create_write_pool().await?;
    let lock = PostgresDistributedLock::new(lock_pool);

    let scheduler = RefreshScheduler::new(
        Arc::new(lock),
        Arc::new(inventory),
        Arc::new(queue),
        config.scheduler.lock_key,
        config.scheduler.batch_size,
        config.scheduler.min_refresh_interval_hours,
        config.scheduler.max_refresh_interval_hours,
    );

    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let ctrl_c_signal = Arc::clone(&shutdown_signal);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, stopping after the current tick");
            ctrl_c_signal.store(true, Ordering::Relaxed);
        }
    });

    run_tick_loop(&scheduler, config.scheduler.tick_interval_seconds, &shutdown_signal).await
}

async fn run_tick_loop(
    scheduler: &RefreshScheduler,
    tick_interval_seconds: u64,
    shutdown_signal: &AtomicBool,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(tick_interval_seconds));

    while !shutdown_signal.load(Ordering::Relaxed) {
        interval.tick().await;

        match scheduler.tick().await {
            Ok(Some(report)) => {
                info!(
                    considered = report.considered,
                    enqueued = report.enqueued,
                    excluded_failures = report.excluded_failures,
                    excluded_stale = report.excluded_stale,
                    not_due = report.not_due,
                    enqueue_errors = report.enqueue_errors,
                    "refresh scheduler tick complete"
                );
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "refresh scheduler tick failed"),
        }
    }

    info!("refresh scheduler shut down cleanly");
    Ok(())
}
