//! Bulk executor with a fatal-on-error policy.

use log::{debug, error};

use super::bulk::BulkOperation;
use super::sync_traits::SearchIndexClientTrait;
use crate::errors::{Error, Result};

/// Operation counts of one accepted bulk call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: usize,
    pub deleted: usize,
}

pub struct BulkExecutor<'a> {
    client: &'a dyn SearchIndexClientTrait,
    index: &'a str,
    refresh: bool,
}

impl<'a> BulkExecutor<'a> {
    pub fn new(client: &'a dyn SearchIndexClientTrait, index: &'a str, refresh: bool) -> Self {
        Self {
            client,
            index,
            refresh,
        }
    }

    pub fn index(&self) -> &str {
        self.index
    }

    /// Submits the whole page as one bulk call.
    ///
    /// Any item-level error fails the call with [`Error::BulkRejected`]
    /// carrying the raw error objects. Nothing is retried here.
    pub async fn execute(&self, operations: &[BulkOperation]) -> Result<BulkOutcome> {
        if operations.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let response = self
            .client
            .bulk(self.index, operations, self.refresh)
            .await?;

        if response.has_failures() {
            let failed = response.failed_items();
            let payload = serde_json::to_string(&failed)?;
            error!(
                "[SearchSync] Bulk write to '{}' rejected {} of {} item(s)",
                self.index,
                failed.len(),
                operations.len()
            );
            return Err(Error::BulkRejected {
                index: self.index.to_string(),
                failed: failed.len(),
                payload,
            });
        }

        let deleted = operations.iter().filter(|op| op.is_delete()).count();
        let outcome = BulkOutcome {
            indexed: operations.len() - deleted,
            deleted,
        };
        debug!(
            "[SearchSync] Bulk write to '{}' took {}ms: {} indexed, {} deleted",
            self.index, response.took, outcome.indexed, outcome.deleted
        );
        Ok(outcome)
    }
}
