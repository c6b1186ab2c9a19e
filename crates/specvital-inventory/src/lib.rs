//! Inventory persistence layer: codebases, analyses, and the depth-batched
//! file/suite/test tree a single analysis produces.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool_manager;
pub mod repository;
pub mod traits;

pub mod mock;
pub use mock::MockInventoryStore;

pub use error::{InventoryError, InventoryErrorExt, InventoryOperation, InventoryResult};
pub use migrations::{run_migrations, wait_for_migrations};
pub use models::*;
pub use pool_manager::{ConnectionStats, PoolManager, PoolStats};
pub use repository::{connect, PostgresInventoryStore};
pub use traits::InventoryStore;
