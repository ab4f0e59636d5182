//! Selection planner: turns a sync mode into repository criteria and a
//! paging strategy.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use super::sync_model::{PagingStrategy, SelectionFilter, SyncMode, SyncPlan};
use crate::config::SyncConfig;

pub struct SelectionPlanner<'a> {
    config: &'a SyncConfig,
}

impl<'a> SelectionPlanner<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    /// Plan a run for `mode` as of `now` (UTC, naive).
    pub fn plan(&self, mode: &SyncMode, now: NaiveDateTime) -> SyncPlan {
        match mode {
            SyncMode::All => SyncPlan {
                filter: SelectionFilter::All,
                paging: PagingStrategy::Offset,
                known_total: None,
            },
            SyncMode::Enabled => SyncPlan {
                filter: SelectionFilter::Enabled,
                paging: PagingStrategy::Offset,
                known_total: None,
            },
            // Synced rows drop out of this filter, so every page reads from the top.
            SyncMode::Outdated => SyncPlan {
                filter: SelectionFilter::SyncedBefore(now - self.config.outdated_after()),
                paging: PagingStrategy::RequeryUntilEmpty,
                known_total: None,
            },
            SyncMode::ActiveRecently => SyncPlan {
                filter: SelectionFilter::ActiveSince(now - self.config.active_recently()),
                paging: PagingStrategy::Offset,
                known_total: None,
            },
            SyncMode::ActiveLastMinute => SyncPlan {
                filter: SelectionFilter::ActiveSince(now - self.config.active_last_minute()),
                paging: PagingStrategy::Offset,
                known_total: None,
            },
            SyncMode::ExplicitIds(ids) => {
                let ids: BTreeSet<i64> = ids.iter().copied().collect();
                SyncPlan {
                    known_total: Some(ids.len() as i64),
                    filter: SelectionFilter::Ids(ids),
                    paging: PagingStrategy::Offset,
                }
            }
        }
    }
}
