//! Analyzer worker: dispatches `analyze` jobs from the durable queue through
//! the analyze orchestrator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use specvital_config::validation::Validate;
use specvital_config::ApplicationConfig;
use specvital_credentials::PostgresCredentialStore;
use specvital_inventory::PoolManager;
use specvital_orchestrator::{AnalyzeOrchestrator, AnalyzeRequest};
use specvital_parser::ProcessParserAdapter;
use specvital_queue::{queues, ClaimedJob, FairnessGate, JobQueue, PostgresJobQueue};
use specvital_source::GitSourceAcquirer;

/// No host multi-tenancy in this system yet; every codebase lives on github.com.
const GIT_HOST: &str = "github.com";

const ANALYZE_QUEUES: [&str; 3] = [
    queues::ANALYSIS_PRIORITY,
    queues::ANALYSIS_DEFAULT,
    queues::ANALYSIS_SCHEDULED,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    specvital_common::initialize_environment();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ApplicationConfig::from_env();
    config.validate()?;
    info!(database = %config.database.safe_connection_string(), "starting specvital analyzer worker");

    let pools = PoolManager::new(&config.database).await?;
    let inventory = specvital_inventory::connect(pools.clone(), pools.write_pool()).await?;

    let queue_pool = config.database.create_write_pool().await?;
    specvital_queue::migrations::run_migrations(&queue_pool).await?;
    let queue = PostgresJobQueue::new(queue_pool, config.queue.initial_backoff_seconds);

    let credentials_pool = config.database.create_read_pool().await?;
    let credentials = PostgresCredentialStore::new(credentials_pool, &config.credentials.key_env_var)?;

    let source = GitSourceAcquirer::new(PathBuf::from(config.source.clone_root.as_str()));
    let parser = ProcessParserAdapter::new(config.parser.binary_path.as_str(), config.parser.timeout_seconds);

    let orchestrator = AnalyzeOrchestrator::new(
        Arc::new(source),
        Arc::new(parser),
        Arc::new(inventory),
        Some(Arc::new(credentials)),
        config.orchestrator.concurrency_limit,
        GIT_HOST,
        env!("CARGO_PKG_VERSION"),
    );

    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let ctrl_c_signal = Arc::clone(&shutdown_signal);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, stopping job claims");
            ctrl_c_signal.store(true, Ordering::Relaxed);
        }
    });

    let fairness = config.fairness.enabled.then(|| {
        Arc::new(FairnessGate::new(config.fairness.max_concurrent_per_user))
    });

    run_dispatch_loop(&queue, &orchestrator, &config, fairness.as_ref(), &shutdown_signal).await
}

/// Stop-claiming-new-jobs half of the shutdown sequence: in-flight jobs
/// still run to completion through `dispatch`, only the next poll is
/// skipped once `shutdown_signal` flips.
async fn run_dispatch_loop(
    queue: &PostgresJobQueue,
    orchestrator: &AnalyzeOrchestrator,
    config: &ApplicationConfig,
    fairness: Option<&Arc<FairnessGate>>,
    shutdown_signal: &AtomicBool,
) -> anyhow::Result<()> {
    let poll_interval = Duration::from_millis(config.queue.poll_interval_ms);
    let snooze_min = Duration::from_secs(config.fairness.snooze_min_seconds);
    let snooze_max = Duration::from_secs(config.fairness.snooze_max_seconds);

    while !shutdown_signal.load(Ordering::Relaxed) {
        let mut claimed_any = false;

        for queue_name in ANALYZE_QUEUES {
            let jobs = queue.fetch(queue_name, config.queue.claim_batch_size).await?;
            if jobs.is_empty() {
                continue;
            }
            claimed_any = true;

            // Every job claimed in one batch is dispatched concurrently; the
            // batch size itself is the per-tier worker pool width from §4.1.
            let mut running = tokio::task::JoinSet::new();
            for job in jobs {
                if let Some(gate) = fairness {
                    if let Some(user_id) = job.row.args.get("user_id").and_then(serde_json::Value::as_str) {
                        if !gate.try_admit(queue_name, user_id) {
                            let delay = FairnessGate::jitter_delay(snooze_min, snooze_max);
                            let run_at = chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
                            if let Err(e) = queue.snooze(job.row.id, run_at).await {
                                error!(job_id = %job.row.id, error = %e, "failed to snooze fairness-gated job");
                            }
                            continue;
                        }
                        let gate = Arc::clone(gate);
                        let queue_name = queue_name.to_string();
                        let user_id = user_id.to_string();
                        let queue = queue.clone();
                        let orchestrator = orchestrator.clone();
                        running.spawn(async move {
                            dispatch(&queue, &orchestrator, job).await;
                            gate.release(&queue_name, &user_id);
                        });
                        continue;
                    }
                }

                let queue = queue.clone();
                let orchestrator = orchestrator.clone();
                running.spawn(async move { dispatch(&queue, &orchestrator, job).await });
            }
            while running.join_next().await.is_some() {}
        }

        if !claimed_any {
            tokio::time::sleep(poll_interval).await;
        }
    }

    info!("analyzer worker shut down cleanly");
    Ok(())
}

/// Run one claimed job to completion and report its outcome back to the
/// queue. A permanent orchestrator error cancels the job rather than
/// retrying it; everything else is a retryable failure.
async fn dispatch(queue: &dyn JobQueue, orchestrator: &AnalyzeOrchestrator, job: ClaimedJob) {
    let request = match parse_request(&job.row.args) {
        Ok(request) => request,
        Err(message) => {
            error!(job_id = %job.row.id, error = %message, "malformed analyze job payload");
            if let Err(e) = queue.fail(job.row.id, &message).await {
                error!(job_id = %job.row.id, error = %e, "failed to mark malformed job as failed");
            }
            return;
        }
    };

    match orchestrator.analyze_with_timeout(request).await {
        Ok(analysis_id) => {
            info!(job_id = %job.row.id, %analysis_id, "analyze job completed");
            if let Err(e) = queue.complete(job.row.id).await {
                error!(job_id = %job.row.id, error = %e, "failed to mark job completed");
            }
        }
        Err(err) => {
            let permanent = err.is_permanent();
            warn!(job_id = %job.row.id, error = %err, permanent, "analyze job failed");

            let outcome = if permanent {
                queue.cancel(job.row.id).await
            } else {
                queue.fail(job.row.id, &err.to_string()).await
            };
            if let Err(e) = outcome {
                error!(job_id = %job.row.id, error = %e, "failed to record job outcome");
            }
        }
    }
}

fn parse_request(args: &serde_json::Value) -> Result<AnalyzeRequest, String> {
    let owner = args
        .get("owner")
        .and_then(serde_json::Value::as_str)
        .ok_or("job payload is missing 'owner'")?
        .to_string();
    let repo = args
        .get("repo")
        .and_then(serde_json::Value::as_str)
        .ok_or("job payload is missing 'repo'")?
        .to_string();
    let commit_sha = args.get("commit_sha").and_then(serde_json::Value::as_str).map(str::to_string);
    let user_id = args
        .get("user_id")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| uuid::Uuid::parse_str(s).ok());

    Ok(AnalyzeRequest { owner, repo, commit_sha, user_id })
}
