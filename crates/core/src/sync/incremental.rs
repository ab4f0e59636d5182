//! Narrow pipelines that write a single counter field, and the daily
//! counter reset.

use async_trait::async_trait;
use chrono::{DurationRound, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use log::debug;
use serde_json::{Map, Value};

use super::bulk::{ConflictPolicy, Script, UpdateByQueryRequest};
use super::document::{INVITES_TODAY_FIELD, MESSAGES_RECEIVED_FIELD};
use super::executor::BulkExecutor;
use super::pager::{PageHandler, SyncCursor};
use super::reconciler::PostSyncReconciler;
use super::sync_model::{DirtyFlag, InviteCount, Reconciliation, SyncSummary};
use super::sync_traits::SearchSourceRepositoryTrait;
use super::translator::counter_operation;
use crate::errors::{Error, Result};

/// Time range read by one invite-count run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InviteWindow {
    /// Midnight of the day the bucket belongs to.
    pub day_start: NaiveDateTime,
    pub bucket_start: NaiveDateTime,
    /// Exclusive.
    pub bucket_end: NaiveDateTime,
}

/// The bucket that closed most recently before `now`.
pub fn invite_window(now: NaiveDateTime, bucket: TimeDelta) -> Result<InviteWindow> {
    let bucket_end = now
        .duration_trunc(bucket)
        .map_err(|err| Error::config(format!("invalid invite bucket: {}", err)))?;
    let bucket_start = bucket_end - bucket;
    Ok(InviteWindow {
        day_start: bucket_start.date().and_time(NaiveTime::MIN),
        bucket_start,
        bucket_end,
    })
}

/// Day on which a user's latest message leaves the rolling window.
pub fn message_boundary_date(now: NaiveDateTime, window: TimeDelta) -> NaiveDate {
    (now - window).date()
}

/// Zeroes `invites_today` on every document that has it, skipping
/// documents that change underneath.
pub fn counter_reset_request(refresh: bool) -> UpdateByQueryRequest {
    let mut bounds = Map::new();
    bounds.insert("gte".to_string(), Value::from(0));
    let mut field = Map::new();
    field.insert(INVITES_TODAY_FIELD.to_string(), Value::Object(bounds));
    let mut query = Map::new();
    query.insert("range".to_string(), Value::Object(field));

    UpdateByQueryRequest {
        query: Value::Object(query),
        script: Script::inline(format!("ctx._source.{} = 0", INVITES_TODAY_FIELD)),
        conflicts: ConflictPolicy::Proceed,
        refresh,
    }
}

/// Writes `messages_received` for a chunk of user ids.
pub(crate) struct MessageCountHandler<'a> {
    pub repository: &'a dyn SearchSourceRepositoryTrait,
    pub executor: BulkExecutor<'a>,
    pub reconciler: &'a PostSyncReconciler,
    pub since: NaiveDateTime,
    pub retry_on_conflict: u32,
    /// Clear the `messages` flag of every written user.
    pub clear_flag: bool,
    pub summary: SyncSummary,
}

#[async_trait]
impl PageHandler<i64> for MessageCountHandler<'_> {
    async fn handle_page(&mut self, cursor: &SyncCursor, user_ids: Vec<i64>) -> Result<()> {
        let counts = self
            .repository
            .count_messages_received(&user_ids, self.since)
            .await?;
        let operations: Vec<_> = user_ids
            .iter()
            .map(|id| {
                let count = counts.get(id).copied().unwrap_or(0);
                counter_operation(*id, MESSAGES_RECEIVED_FIELD, count, self.retry_on_conflict)
            })
            .collect();

        let outcome = self.executor.execute(&operations).await?;
        self.summary.indexed += outcome.indexed;
        debug!(
            "[SearchSync] Message counts page {}/{}: {} user(s)",
            cursor.page_index + 1,
            cursor.total_pages,
            user_ids.len()
        );

        if self.clear_flag {
            let reconciled = self
                .reconciler
                .reconcile(&user_ids, Reconciliation::DirtyFlag(DirtyFlag::Messages))
                .await;
            if !reconciled.is_done() {
                self.summary.reconcile_failures += user_ids.len();
            }
        }
        Ok(())
    }
}

/// Writes `invites_today` for a chunk of aggregated counts.
pub(crate) struct InviteCountHandler<'a> {
    pub executor: BulkExecutor<'a>,
    pub retry_on_conflict: u32,
    pub summary: SyncSummary,
}

#[async_trait]
impl PageHandler<InviteCount> for InviteCountHandler<'_> {
    async fn handle_page(&mut self, cursor: &SyncCursor, counts: Vec<InviteCount>) -> Result<()> {
        let operations: Vec<_> = counts
            .iter()
            .map(|invites| {
                counter_operation(
                    invites.user_id,
                    INVITES_TODAY_FIELD,
                    invites.count,
                    self.retry_on_conflict,
                )
            })
            .collect();

        let outcome = self.executor.execute(&operations).await?;
        self.summary.indexed += outcome.indexed;
        debug!(
            "[SearchSync] Invite counts page {}/{}: {} user(s)",
            cursor.page_index + 1,
            cursor.total_pages,
            counts.len()
        );
        Ok(())
    }
}
