//! Centralized configuration management for the analysis-worker platform
//!
//! This crate provides a unified configuration system that eliminates duplication
//! across the worker crates and provides type-safe, validated configuration with
//! support for multiple sources (environment, files, etc.).
//!
//! Configuration follows a simple hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides
//! 3. Runtime validation

pub mod error;
pub mod source;
pub mod validation;

pub use error::{ConfigError, ConfigResult};

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Database configuration (safe local defaults)
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "specvital";
const DEFAULT_DB_USER: &str = "specvital";
const DEFAULT_DB_PASSWORD: &str = "localdev123";
const DEFAULT_DB_SSL_MODE: &str = "disable";
const DEFAULT_DB_WRITE_POOL_SIZE: u32 = 10;
const DEFAULT_DB_READ_POOL_SIZE: u32 = 20;
const DEFAULT_DB_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_DB_IDLE_TIMEOUT_SECONDS: u64 = 600;
const DEFAULT_DB_MAX_LIFETIME_SECONDS: u64 = 1800;
const DEFAULT_AUTO_MIGRATE: bool = true;

// Durable job queue configuration
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_QUEUE_CLAIM_BATCH_SIZE: u32 = 1;
const DEFAULT_QUEUE_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_QUEUE_INITIAL_BACKOFF_SECONDS: u64 = 15;

// Source acquisition configuration
const DEFAULT_SOURCE_CLONE_ROOT: &str = "/tmp/specvital-clones";
const DEFAULT_SOURCE_CLONE_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_SOURCE_MAX_CONCURRENT_CLONES: usize = 4;

// Parser adapter configuration
const DEFAULT_PARSER_BINARY_PATH: &str = "test-inventory-parser";
const DEFAULT_PARSER_TIMEOUT_SECONDS: u64 = 180;

// Credential store configuration
const DEFAULT_CREDENTIALS_KEY_ENV_VAR: &str = "SPECVITAL_CREDENTIALS_ENCRYPTION_KEY";

// Orchestrator configuration
const DEFAULT_ORCHESTRATOR_CONCURRENCY_LIMIT: usize = 4;
const DEFAULT_ORCHESTRATOR_MAX_SUITE_NAME_BYTES: usize = 500;
const DEFAULT_ORCHESTRATOR_MAX_TEST_NAME_BYTES: usize = 2000;

// Optional per-user fairness gate (disabled by default)
const DEFAULT_FAIRNESS_ENABLED: bool = false;
const DEFAULT_FAIRNESS_MAX_CONCURRENT_PER_USER: usize = 3;
const DEFAULT_FAIRNESS_SNOOZE_MIN_SECONDS: u64 = 1;
const DEFAULT_FAIRNESS_SNOOZE_MAX_SECONDS: u64 = 10;

// Refresh scheduler / decay configuration
const DEFAULT_SCHEDULER_TICK_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_SCHEDULER_BATCH_SIZE: i64 = 50;
const DEFAULT_SCHEDULER_LOCK_KEY: i64 = 9_741_001;
const DEFAULT_SCHEDULER_MIN_REFRESH_INTERVAL_HOURS: i64 = 1;
const DEFAULT_SCHEDULER_MAX_REFRESH_INTERVAL_HOURS: i64 = 24 * 30;

// Telemetry configuration
const DEFAULT_TELEMETRY_ENABLED: bool = false;
const DEFAULT_TRACING_LEVEL: &str = "info";
const DEFAULT_TRACE_SAMPLE_RATE: f64 = 0.1;
const DEFAULT_TELEMETRY_SERVICE_NAME: &str = "specvital-worker";
const DEFAULT_TELEMETRY_ENVIRONMENT: &str = "development";

use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use std::time::Duration;

/// Core configuration for the entire analysis-worker application.
///
/// All settings have safe defaults and can be overridden via environment variables.
/// No profile/environment selection is required - the same defaults work everywhere.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Database connection configuration
    pub database: DatabaseConfig,

    /// Durable job queue configuration
    pub queue: QueueConfig,

    /// Source acquisition (clone) configuration
    pub source: SourceConfig,

    /// Parser adapter configuration
    pub parser: ParserConfig,

    /// Credential store configuration
    pub credentials: CredentialsConfig,

    /// Analyze orchestrator configuration
    pub orchestrator: OrchestratorConfig,

    /// Optional per-user fairness gate
    pub fairness: FairnessConfig,

    /// Refresh scheduler / auto-refresh decay configuration
    pub scheduler: SchedulerConfig,

    /// Telemetry and observability configuration
    pub telemetry: TelemetryConfig,
}

/// Database configuration - comprehensive `PostgreSQL` configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication (use environment variables for security)
    pub password: String,

    /// SSL mode for connections ("disable", "prefer", "require")
    pub ssl_mode: String,

    /// Maximum connections in the write pool (queue claims, mutations)
    pub write_pool_size: u32,

    /// Maximum connections in the read pool (candidate scans, listings)
    pub read_pool_size: u32,

    /// Connection acquire timeout in seconds
    pub timeout_seconds: u64,

    /// Idle timeout in seconds before a pooled connection is dropped
    pub idle_timeout_seconds: u64,

    /// Maximum lifetime of a pooled connection in seconds
    pub max_lifetime_seconds: u64,

    /// Run migrations automatically on startup
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        let host = std::env::var("SPECVITAL_DATABASE_HOST")
            .or_else(|_| std::env::var("DB_HOST"))
            .unwrap_or_else(|_| DEFAULT_DB_HOST.to_string());

        let port = std::env::var("SPECVITAL_DATABASE_PORT")
            .or_else(|_| std::env::var("DB_PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_PORT);

        let database = std::env::var("SPECVITAL_DATABASE_NAME")
            .or_else(|_| std::env::var("DB_NAME"))
            .unwrap_or_else(|_| DEFAULT_DB_NAME.to_string());

        let username = std::env::var("SPECVITAL_DATABASE_USERNAME")
            .or_else(|_| std::env::var("DB_USER"))
            .unwrap_or_else(|_| DEFAULT_DB_USER.to_string());

        let password = std::env::var("SPECVITAL_DATABASE_PASSWORD")
            .or_else(|_| std::env::var("DB_PASSWORD"))
            .unwrap_or_else(|_| {
                tracing::warn!(
                    "Using default database password - set SPECVITAL_DATABASE_PASSWORD in production"
                );
                DEFAULT_DB_PASSWORD.to_string()
            });

        let ssl_mode = std::env::var("SPECVITAL_DATABASE_SSL_MODE")
            .or_else(|_| std::env::var("DB_SSLMODE"))
            .unwrap_or_else(|_| DEFAULT_DB_SSL_MODE.to_string());

        let write_pool_size = std::env::var("SPECVITAL_DATABASE_WRITE_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_WRITE_POOL_SIZE);

        let read_pool_size = std::env::var("SPECVITAL_DATABASE_READ_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_READ_POOL_SIZE);

        let timeout_seconds = std::env::var("SPECVITAL_DATABASE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_TIMEOUT_SECONDS);

        let idle_timeout_seconds = std::env::var("SPECVITAL_DATABASE_IDLE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_IDLE_TIMEOUT_SECONDS);

        let max_lifetime_seconds = std::env::var("SPECVITAL_DATABASE_MAX_LIFETIME_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_MAX_LIFETIME_SECONDS);

        let auto_migrate = std::env::var("SPECVITAL_DATABASE_AUTO_MIGRATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_AUTO_MIGRATE);

        Self {
            host,
            port,
            database,
            username,
            password,
            ssl_mode,
            write_pool_size,
            read_pool_size,
            timeout_seconds,
            idle_timeout_seconds,
            max_lifetime_seconds,
            auto_migrate,
        }
    }

    fn parse_ssl_mode(&self) -> PgSslMode {
        match self.ssl_mode.as_str() {
            "disable" => PgSslMode::Disable,
            "require" => PgSslMode::Require,
            _ => PgSslMode::Prefer,
        }
    }

    /// Build `PostgreSQL` connection options (never exposes a URL with the password in it)
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
            .ssl_mode(self.parse_ssl_mode())
    }

    /// Create a write-oriented connection pool sized from `write_pool_size`
    ///
    /// # Errors
    /// Returns an error if connection to the database fails
    pub async fn create_write_pool(&self) -> Result<PgPool, sqlx::Error> {
        self.build_pool(self.write_pool_size).await
    }

    /// Create a read-oriented connection pool sized from `read_pool_size`
    ///
    /// # Errors
    /// Returns an error if connection to the database fails
    pub async fn create_read_pool(&self) -> Result<PgPool, sqlx::Error> {
        self.build_pool(self.read_pool_size).await
    }

    async fn build_pool(&self, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(self.timeout_seconds))
            .idle_timeout(Duration::from_secs(self.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(self.max_lifetime_seconds))
            .connect_with(self.connect_options())
            .await
    }

    /// Get connection info for logging, deliberately excluding the password
    pub fn safe_connection_string(&self) -> String {
        format!(
            "{}@{}:{}/{} (ssl: {})",
            self.username, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

impl validation::Validate for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.host, "database.host")?;
        validation::validate_non_empty(&self.database, "database.database")?;
        validation::validate_port(self.port, "database.port")?;
        validation::validate_range(
            u64::from(self.write_pool_size),
            1,
            1000,
            "database.write_pool_size",
        )?;
        validation::validate_range(
            u64::from(self.read_pool_size),
            1,
            1000,
            "database.read_pool_size",
        )?;
        validation::validate_range(self.timeout_seconds, 1, 3600, "database.timeout_seconds")?;
        Ok(())
    }
}

/// Durable job queue configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueConfig {
    /// How often a worker polls for work when no job is immediately available, in milliseconds
    pub poll_interval_ms: u64,

    /// Number of jobs claimed per fetch call
    pub claim_batch_size: u32,

    /// Default maximum attempts before a job is marked discarded
    pub max_attempts: i32,

    /// Base backoff, in seconds, multiplied by `attempt^2` for retry scheduling
    pub initial_backoff_seconds: u64,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let poll_interval_ms = std::env::var("SPECVITAL_QUEUE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_POLL_INTERVAL_MS);

        let claim_batch_size = std::env::var("SPECVITAL_QUEUE_CLAIM_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_CLAIM_BATCH_SIZE);

        let max_attempts = std::env::var("SPECVITAL_QUEUE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_MAX_ATTEMPTS);

        let initial_backoff_seconds = std::env::var("SPECVITAL_QUEUE_INITIAL_BACKOFF_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_INITIAL_BACKOFF_SECONDS);

        Self {
            poll_interval_ms,
            claim_batch_size,
            max_attempts,
            initial_backoff_seconds,
        }
    }
}

impl validation::Validate for QueueConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.poll_interval_ms, 1, 60_000, "queue.poll_interval_ms")?;
        validation::validate_range(
            u64::from(self.claim_batch_size),
            1,
            1000,
            "queue.claim_batch_size",
        )?;
        validation::validate_range(
            u64::try_from(self.max_attempts).unwrap_or(0),
            1,
            100,
            "queue.max_attempts",
        )?;
        Ok(())
    }
}

/// Source acquisition (clone) configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceConfig {
    /// Filesystem root under which repositories are cloned
    pub clone_root: String,

    /// Maximum time allowed for a single clone, in seconds
    pub clone_timeout_seconds: u64,

    /// Maximum number of clones running concurrently (orchestrator semaphore bound)
    pub max_concurrent_clones: usize,
}

impl SourceConfig {
    pub fn from_env() -> Self {
        let clone_root = std::env::var("SPECVITAL_SOURCE_CLONE_ROOT")
            .unwrap_or_else(|_| DEFAULT_SOURCE_CLONE_ROOT.to_string());

        let clone_timeout_seconds = std::env::var("SPECVITAL_SOURCE_CLONE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SOURCE_CLONE_TIMEOUT_SECONDS);

        let max_concurrent_clones = std::env::var("SPECVITAL_SOURCE_MAX_CONCURRENT_CLONES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SOURCE_MAX_CONCURRENT_CLONES);

        Self {
            clone_root,
            clone_timeout_seconds,
            max_concurrent_clones,
        }
    }
}

impl validation::Validate for SourceConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.clone_root, "source.clone_root")?;
        validation::validate_range(
            self.clone_timeout_seconds,
            1,
            3600,
            "source.clone_timeout_seconds",
        )?;
        validation::validate_range(
            self.max_concurrent_clones as u64,
            1,
            256,
            "source.max_concurrent_clones",
        )?;
        Ok(())
    }
}

/// Parser adapter configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParserConfig {
    /// Path to (or name of, if on `$PATH`) the external test-inventory parser binary
    pub binary_path: String,

    /// Maximum time allowed for a single scan invocation, in seconds
    pub timeout_seconds: u64,
}

impl ParserConfig {
    pub fn from_env() -> Self {
        let binary_path = std::env::var("SPECVITAL_PARSER_BINARY_PATH")
            .unwrap_or_else(|_| DEFAULT_PARSER_BINARY_PATH.to_string());

        let timeout_seconds = std::env::var("SPECVITAL_PARSER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PARSER_TIMEOUT_SECONDS);

        Self {
            binary_path,
            timeout_seconds,
        }
    }
}

impl validation::Validate for ParserConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.binary_path, "parser.binary_path")?;
        validation::validate_range(self.timeout_seconds, 1, 3600, "parser.timeout_seconds")?;
        Ok(())
    }
}

/// Credential store configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CredentialsConfig {
    /// Name of the environment variable holding the AES-256 encryption key (hex-encoded, 32 bytes)
    pub key_env_var: String,
}

impl CredentialsConfig {
    pub fn from_env() -> Self {
        let key_env_var = std::env::var("SPECVITAL_CREDENTIALS_KEY_ENV_VAR")
            .unwrap_or_else(|_| DEFAULT_CREDENTIALS_KEY_ENV_VAR.to_string());

        Self { key_env_var }
    }
}

impl validation::Validate for CredentialsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.key_env_var, "credentials.key_env_var")?;
        Ok(())
    }
}

/// Analyze orchestrator configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum concurrent clone+scan pipelines (bounds the clone semaphore)
    pub concurrency_limit: usize,

    /// Maximum bytes retained for a suite name before truncation
    pub max_suite_name_bytes: usize,

    /// Maximum bytes retained for a test name before truncation
    pub max_test_name_bytes: usize,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let concurrency_limit = std::env::var("SPECVITAL_ORCHESTRATOR_CONCURRENCY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ORCHESTRATOR_CONCURRENCY_LIMIT);

        let max_suite_name_bytes = std::env::var("SPECVITAL_ORCHESTRATOR_MAX_SUITE_NAME_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ORCHESTRATOR_MAX_SUITE_NAME_BYTES);

        let max_test_name_bytes = std::env::var("SPECVITAL_ORCHESTRATOR_MAX_TEST_NAME_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ORCHESTRATOR_MAX_TEST_NAME_BYTES);

        Self {
            concurrency_limit,
            max_suite_name_bytes,
            max_test_name_bytes,
        }
    }
}

impl validation::Validate for OrchestratorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(
            self.concurrency_limit as u64,
            1,
            256,
            "orchestrator.concurrency_limit",
        )?;
        validation::validate_range(
            self.max_suite_name_bytes as u64,
            1,
            100_000,
            "orchestrator.max_suite_name_bytes",
        )?;
        validation::validate_range(
            self.max_test_name_bytes as u64,
            1,
            100_000,
            "orchestrator.max_test_name_bytes",
        )?;
        Ok(())
    }
}

/// Optional per-user fairness gate (§4.1 "Fairness and timeouts").
///
/// Disabled by default; when enabled, a job whose tier is already running
/// `max_concurrent_per_user` jobs for the same `user_id` is snoozed with a
/// bounded random jitter instead of occupying a worker slot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FairnessConfig {
    /// Whether the fairness gate is active at all
    pub enabled: bool,

    /// Maximum concurrent running jobs per `(queue, user_id)`
    pub max_concurrent_per_user: usize,

    /// Minimum snooze delay applied to a gated job, in seconds
    pub snooze_min_seconds: u64,

    /// Maximum snooze delay applied to a gated job, in seconds
    pub snooze_max_seconds: u64,
}

impl FairnessConfig {
    pub fn from_env() -> Self {
        let enabled = std::env::var("SPECVITAL_FAIRNESS_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAIRNESS_ENABLED);

        let max_concurrent_per_user = std::env::var("SPECVITAL_FAIRNESS_MAX_CONCURRENT_PER_USER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAIRNESS_MAX_CONCURRENT_PER_USER);

        let snooze_min_seconds = std::env::var("SPECVITAL_FAIRNESS_SNOOZE_MIN_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAIRNESS_SNOOZE_MIN_SECONDS);

        let snooze_max_seconds = std::env::var("SPECVITAL_FAIRNESS_SNOOZE_MAX_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAIRNESS_SNOOZE_MAX_SECONDS);

        Self {
            enabled,
            max_concurrent_per_user,
            snooze_min_seconds,
            snooze_max_seconds,
        }
    }
}

impl validation::Validate for FairnessConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(
            self.max_concurrent_per_user as u64,
            1,
            10_000,
            "fairness.max_concurrent_per_user",
        )?;
        validation::validate_range(self.snooze_min_seconds, 0, 3600, "fairness.snooze_min_seconds")?;
        validation::validate_range(
            self.snooze_max_seconds,
            self.snooze_min_seconds,
            3600,
            "fairness.snooze_max_seconds",
        )?;
        Ok(())
    }
}

/// Refresh scheduler / auto-refresh decay configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    /// How often the scheduler wakes up to look for refresh candidates, in seconds
    pub tick_interval_seconds: u64,

    /// Maximum number of candidates enqueued per tick
    pub batch_size: i64,

    /// Postgres advisory lock key used for leader election
    pub lock_key: i64,

    /// Floor of the decayed refresh interval, in hours
    pub min_refresh_interval_hours: i64,

    /// Ceiling of the decayed refresh interval, in hours
    pub max_refresh_interval_hours: i64,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let tick_interval_seconds = std::env::var("SPECVITAL_SCHEDULER_TICK_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SCHEDULER_TICK_INTERVAL_SECONDS);

        let batch_size = std::env::var("SPECVITAL_SCHEDULER_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SCHEDULER_BATCH_SIZE);

        let lock_key = std::env::var("SPECVITAL_SCHEDULER_LOCK_KEY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SCHEDULER_LOCK_KEY);

        let min_refresh_interval_hours =
            std::env::var("SPECVITAL_SCHEDULER_MIN_REFRESH_INTERVAL_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SCHEDULER_MIN_REFRESH_INTERVAL_HOURS);

        let max_refresh_interval_hours =
            std::env::var("SPECVITAL_SCHEDULER_MAX_REFRESH_INTERVAL_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SCHEDULER_MAX_REFRESH_INTERVAL_HOURS);

        Self {
            tick_interval_seconds,
            batch_size,
            lock_key,
            min_refresh_interval_hours,
            max_refresh_interval_hours,
        }
    }
}

impl validation::Validate for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(
            self.tick_interval_seconds,
            1,
            86_400,
            "scheduler.tick_interval_seconds",
        )?;
        validation::validate_range(
            u64::try_from(self.batch_size).unwrap_or(0),
            1,
            100_000,
            "scheduler.batch_size",
        )?;
        if self.min_refresh_interval_hours >= self.max_refresh_interval_hours {
            return Err(ConfigError::Generic {
                message: format!(
                    "scheduler.min_refresh_interval_hours ({}) must be less than max_refresh_interval_hours ({})",
                    self.min_refresh_interval_hours, self.max_refresh_interval_hours
                ),
            });
        }
        Ok(())
    }
}

/// Telemetry and observability configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetryConfig {
    /// Enable telemetry collection
    pub enabled: bool,

    /// OpenTelemetry endpoint URL
    pub otlp_endpoint: Option<String>,

    /// Tracing level (trace, debug, info, warn, error)
    pub tracing_level: String,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 disables the listener)
    pub metrics_port: u16,

    /// Sample rate for traces (0.0 to 1.0)
    pub trace_sample_rate: f64,

    /// Service name for telemetry
    pub service_name: String,

    /// Environment label for telemetry
    pub environment: String,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let enabled = std::env::var("SPECVITAL_TELEMETRY_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TELEMETRY_ENABLED);

        let otlp_endpoint = std::env::var("SPECVITAL_TELEMETRY_OTLP_ENDPOINT").ok();

        let tracing_level = std::env::var("SPECVITAL_TELEMETRY_TRACING_LEVEL")
            .unwrap_or_else(|_| DEFAULT_TRACING_LEVEL.to_string());

        let enable_metrics = std::env::var("SPECVITAL_TELEMETRY_ENABLE_METRICS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TELEMETRY_ENABLED);

        let metrics_port = std::env::var("SPECVITAL_TELEMETRY_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let trace_sample_rate = std::env::var("SPECVITAL_TELEMETRY_TRACE_SAMPLE_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TRACE_SAMPLE_RATE);

        let service_name = std::env::var("SPECVITAL_TELEMETRY_SERVICE_NAME")
            .unwrap_or_else(|_| DEFAULT_TELEMETRY_SERVICE_NAME.to_string());

        let environment = std::env::var("SPECVITAL_TELEMETRY_ENVIRONMENT")
            .unwrap_or_else(|_| DEFAULT_TELEMETRY_ENVIRONMENT.to_string());

        Self {
            enabled,
            otlp_endpoint,
            tracing_level,
            enable_metrics,
            metrics_port,
            trace_sample_rate,
            service_name,
            environment,
        }
    }
}

impl validation::Validate for TelemetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.service_name, "telemetry.service_name")?;
        validation::validate_non_empty(&self.environment, "telemetry.environment")?;

        if let Some(ref endpoint) = self.otlp_endpoint {
            validation::validate_url(endpoint, "telemetry.otlp_endpoint")?;
        }

        if self.metrics_port != 0 {
            validation::validate_port(self.metrics_port, "telemetry.metrics_port")?;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let sample_rate_scaled = (self.trace_sample_rate * 1000.0) as u64;
        validation::validate_range(sample_rate_scaled, 0, 1000, "telemetry.trace_sample_rate")?;

        match self.tracing_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Generic {
                message: format!("Invalid tracing level: {}", self.tracing_level),
            }),
        }
    }
}

impl ApplicationConfig {
    /// Load configuration from environment variables with safe defaults
    ///
    /// All configuration is loaded from environment variables or falls back
    /// to safe defaults that work in any environment (dev, staging, prod, test).
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            queue: QueueConfig::from_env(),
            source: SourceConfig::from_env(),
            parser: ParserConfig::from_env(),
            credentials: CredentialsConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            fairness: FairnessConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }
}

impl validation::Validate for ApplicationConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.queue.validate()?;
        self.source.validate()?;
        self.parser.validate()?;
        self.credentials.validate()?;
        self.orchestrator.validate()?;
        self.fairness.validate()?;
        self.scheduler.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validate;

    #[test]
    fn test_application_config_can_be_created() {
        let config = ApplicationConfig::from_env();
        assert_eq!(config.database.host, DEFAULT_DB_HOST);
        assert_eq!(config.queue.max_attempts, DEFAULT_QUEUE_MAX_ATTEMPTS);
    }

    #[test]
    fn test_config_validation_rejects_invalid_otlp_url() {
        let mut config = ApplicationConfig::from_env();
        config.telemetry.otlp_endpoint = Some("not-a-valid-url".to_string());

        let validation_result = config.validate();
        assert!(validation_result.is_err());
    }

    #[test]
    fn test_config_can_be_serialized_to_toml() {
        let config = ApplicationConfig::from_env();
        let toml_result = toml::to_string(&config);
        assert!(toml_result.is_ok(), "Config should serialize to TOML");

        if let Ok(toml_string) = toml_result {
            assert!(toml_string.contains("database"));
            assert!(toml_string.contains("scheduler"));
        }
    }

    #[test]
    fn test_config_uses_safe_defaults() {
        let config = ApplicationConfig::from_env();

        assert_eq!(
            config.source.max_concurrent_clones,
            DEFAULT_SOURCE_MAX_CONCURRENT_CLONES
        );
        assert_eq!(
            config.orchestrator.concurrency_limit,
            DEFAULT_ORCHESTRATOR_CONCURRENCY_LIMIT
        );
    }

    #[test]
    fn test_environment_variable_overrides() {
        unsafe {
            std::env::set_var("SPECVITAL_QUEUE_MAX_ATTEMPTS", "9");
            std::env::set_var("SPECVITAL_DATABASE_PORT", "1234");
        }

        let config = ApplicationConfig::from_env();

        assert_eq!(config.queue.max_attempts, 9);
        assert_eq!(config.database.port, 1234);

        unsafe {
            std::env::remove_var("SPECVITAL_QUEUE_MAX_ATTEMPTS");
            std::env::remove_var("SPECVITAL_DATABASE_PORT");
        }
    }

    #[test]
    fn test_scheduler_validation_catches_inverted_decay_bounds() {
        let mut config = ApplicationConfig::from_env();
        config.scheduler.min_refresh_interval_hours = 100;
        config.scheduler.max_refresh_interval_hours = 10;

        let validation_result = config.validate();
        assert!(validation_result.is_err());
        if let Err(error) = validation_result {
            assert!(error.to_string().contains("min_refresh_interval_hours"));
        }
    }

    #[test]
    fn test_telemetry_config_validation() {
        let mut config = ApplicationConfig::from_env();
        config.telemetry.tracing_level = "invalid-level".to_string();

        let validation_result = config.validate();
        assert!(validation_result.is_err());

        if let Err(error) = validation_result {
            assert!(error.to_string().contains("Invalid tracing level"));
        }
    }

    #[test]
    fn test_fairness_gate_disabled_by_default() {
        let config = ApplicationConfig::from_env();
        assert!(!config.fairness.enabled);
        assert_eq!(
            config.fairness.max_concurrent_per_user,
            DEFAULT_FAIRNESS_MAX_CONCURRENT_PER_USER
        );
    }

    #[test]
    fn test_fairness_validation_rejects_inverted_snooze_bounds() {
        let mut config = ApplicationConfig::from_env();
        config.fairness.snooze_min_seconds = 30;
        config.fairness.snooze_max_seconds = 5;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_creates_valid_config() {
        let config = ApplicationConfig::from_env();
        let validation_result = config.validate();
        assert!(
            validation_result.is_ok(),
            "from_env() should create valid config: {validation_result:?}"
        );
    }

    #[test]
    fn test_configuration_source_loading() {
        use crate::source::{ConfigurationLoader, EnvironmentSource};

        let loader = ConfigurationLoader::new().add_source(Box::new(EnvironmentSource));

        let config_result = loader.load();
        assert!(config_result.is_ok());

        if let Ok(config) = config_result {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_telemetry_defaults() {
        let config = ApplicationConfig::from_env();

        assert!(
            (config.telemetry.trace_sample_rate - DEFAULT_TRACE_SAMPLE_RATE).abs() < f64::EPSILON
        );
        assert_eq!(config.telemetry.tracing_level, DEFAULT_TRACING_LEVEL);
        assert_eq!(
            config.telemetry.service_name,
            DEFAULT_TELEMETRY_SERVICE_NAME
        );
    }

    #[test]
    fn test_configuration_serialization_roundtrip() {
        let original_config = ApplicationConfig::from_env();

        let toml_result = toml::to_string(&original_config);
        assert!(toml_result.is_ok());

        if let Ok(toml_string) = toml_result {
            let parsed_result: Result<ApplicationConfig, _> = toml::from_str(&toml_string);
            assert!(parsed_result.is_ok());

            if let Ok(parsed_config) = parsed_result {
                assert_eq!(original_config.database.host, parsed_config.database.host);
                assert_eq!(
                    original_config.scheduler.lock_key,
                    parsed_config.scheduler.lock_key
                );
                assert!(parsed_config.validate().is_ok());
            }
        }
    }
}
