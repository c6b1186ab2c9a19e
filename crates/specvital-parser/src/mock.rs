//! In-memory `ParserAdapter` for unit testing callers of this crate

use crate::error::{ParserError, ParserResult};
use crate::models::Inventory;
use crate::traits::ParserAdapter;
use async_trait::async_trait;
use specvital_source::Source;

#[derive(Clone, Default)]
pub struct MockParserAdapter {
    pub inventory: Inventory,
    pub fail: bool,
}

impl MockParserAdapter {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            fail: false,
        }
    }

    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl ParserAdapter for MockParserAdapter {
    async fn scan(&self, _source: &dyn Source) -> ParserResult<Inventory> {
        if self.fail {
            return Err(ParserError::NonZeroExit {
                status: 1,
                stderr: "mock configured to fail".to_string(),
            });
        }
        Ok(self.inventory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specvital_source::MockSourceAcquirer;
    use specvital_source::SourceAcquirer;

    #[tokio::test]
    async fn test_scan_returns_configured_inventory() {
        let acquirer = MockSourceAcquirer::new();
        let source = acquirer.clone("https://example.com/repo.git", None, None).await.unwrap();

        let parser = MockParserAdapter::new(Inventory::default());
        let result = parser.scan(source.as_ref()).await.unwrap();
        assert_eq!(result.files.len(), 0);
    }

    #[tokio::test]
    async fn test_scan_fails_when_configured() {
        let acquirer = MockSourceAcquirer::new();
        let source = acquirer.clone("https://example.com/repo.git", None, None).await.unwrap();

        let parser = MockParserAdapter::new(Inventory::default()).failing();
        let result = parser.scan(source.as_ref()).await;
        assert!(result.is_err());
    }
}
