//! The parser adapter capability: a thin, pure call into an external
//! test-inventory parser over a cloned `Source`.

use crate::error::ParserResult;
use crate::models::Inventory;
use async_trait::async_trait;
use specvital_source::Source;

#[async_trait]
pub trait ParserAdapter: Send + Sync {
    /// Scan `source`'s working copy and return the resulting inventory.
    /// Pure with respect to `source`: no mutation of the working copy.
    async fn scan(&self, source: &dyn Source) -> ParserResult<Inventory>;
}
