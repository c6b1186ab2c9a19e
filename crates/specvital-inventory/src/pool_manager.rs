//! Write/read connection pool separation, per §5: a small write pool for
//! mutation traffic (analysis/suite/test-case inserts) and a larger read
//! pool for `RefreshCandidate` scans and job listings. Both pools are sized
//! from `specvital_config::DatabaseConfig`, which this crate shares with
//! the queue and credentials layers against the same physical database.

use sqlx::PgPool;
use specvital_config::DatabaseConfig;

/// Extension trait for saturating cast from usize to u32
trait SaturatingCast {
    fn saturating_cast(self) -> u32;
}

impl SaturatingCast for usize {
    fn saturating_cast(self) -> u32 {
        u32::try_from(self).unwrap_or(u32::MAX)
    }
}

/// Holds the write and read pools for inventory persistence.
#[derive(Clone)]
pub struct PoolManager {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PoolManager {
    /// Build both pools from `db_config`.
    ///
    /// # Errors
    /// Returns an error if either pool fails to connect.
    pub async fn new(db_config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let write_pool = db_config.create_write_pool().await?;
        let read_pool = db_config.create_read_pool().await?;
        Ok(Self { write_pool, read_pool })
    }

    /// Pool for transactional writes: analysis creation, inventory save, failure recording.
    pub const fn write_pool(&self) -> &PgPool {
        &self.write_pool
    }

    /// Pool for `RefreshCandidate` queries and job listings.
    pub const fn read_pool(&self) -> &PgPool {
        &self.read_pool
    }

    /// Point-in-time utilization snapshot, recorded as tracing fields rather
    /// than persisted (§4.9: "record the band decision in observability
    /// fields but not in the datastore" applies to pool health too).
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            write_pool: ConnectionStats {
                size: self.write_pool.size(),
                idle: self.write_pool.num_idle().saturating_cast(),
                max: self.write_pool.options().get_max_connections(),
            },
            read_pool: ConnectionStats {
                size: self.read_pool.size(),
                idle: self.read_pool.num_idle().saturating_cast(),
                max: self.read_pool.options().get_max_connections(),
            },
        }
    }

    /// Close both pools.
    pub async fn close(&self) {
        self.write_pool.close().await;
        self.read_pool.close().await;
    }
}

/// Statistics for a single connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub size: u32,
    pub idle: u32,
    pub max: u32,
}

/// Combined statistics for both pools.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub write_pool: ConnectionStats,
    pub read_pool: ConnectionStats,
}

impl PoolStats {
    pub const fn total_connections(&self) -> u32 {
        self.write_pool.size.saturating_add(self.read_pool.size)
    }

    pub const fn total_idle(&self) -> u32 {
        self.write_pool.idle.saturating_add(self.read_pool.idle)
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f32 {
        let total = self.total_connections() as f32;
        let idle = self.total_idle() as f32;
        if total > 0.0 {
            ((total - idle) / total) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            write_pool: ConnectionStats { size: 5, idle: 2, max: 10 },
            read_pool: ConnectionStats { size: 10, idle: 5, max: 20 },
        };

        assert_eq!(stats.total_connections(), 15);
        assert_eq!(stats.total_idle(), 7);
        assert!((stats.utilization() - 53.33).abs() < 0.1);
    }

    #[test]
    fn test_pool_stats_zero_connections() {
        let stats = PoolStats {
            write_pool: ConnectionStats { size: 0, idle: 0, max: 10 },
            read_pool: ConnectionStats { size: 0, idle: 0, max: 20 },
        };

        assert!((stats.utilization() - 0.0).abs() < f32::EPSILON);
    }
}
