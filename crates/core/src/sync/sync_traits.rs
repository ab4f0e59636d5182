use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use super::bulk::{BulkOperation, BulkResponse, UpdateByQueryRequest, UpdateByQueryResponse};
use super::log_cleanup::{LogEntry, LogEntryRewrite};
use super::sync_model::{
    AuxiliaryLookups, DeletedIdentity, DirtyFlag, InviteCount, Reconciliation, SelectionFilter,
    SourceUserRow,
};
use crate::errors::Result;

/// Read and bookkeeping access to the relational source of record.
#[async_trait]
pub trait SearchSourceRepositoryTrait: Send + Sync {
    /// Counts the users of `brand` matching `filter`.
    async fn count_users(&self, brand: &str, filter: &SelectionFilter) -> Result<i64>;

    /// Loads one page of flattened user rows ordered by id.
    async fn load_users(
        &self,
        brand: &str,
        filter: &SelectionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SourceUserRow>>;

    /// Computes the correlated lookups for `user_ids`. Messages are counted
    /// from `messages_since` on. Users without related rows may be missing
    /// from the map.
    async fn load_auxiliary_lookups(
        &self,
        user_ids: &[i64],
        messages_since: NaiveDateTime,
    ) -> Result<HashMap<i64, AuxiliaryLookups>>;

    /// Writes a reconciliation for `user_ids` in one batched update and
    /// returns the number of users touched.
    async fn mark_synced(&self, user_ids: &[i64], reconciliation: Reconciliation) -> Result<usize>;

    /// Up to `limit` non-deleted users carrying `flag`, lowest id first.
    async fn load_flagged_user_ids(
        &self,
        brand: &str,
        flag: DirtyFlag,
        limit: i64,
    ) -> Result<Vec<i64>>;

    /// Non-deleted users whose most recent received message was sent on `boundary`.
    async fn load_message_boundary_user_ids(
        &self,
        brand: &str,
        boundary: NaiveDate,
    ) -> Result<Vec<i64>>;

    /// Messages received since `since`, per user. Users with none may be missing.
    async fn count_messages_received(
        &self,
        user_ids: &[i64],
        since: NaiveDateTime,
    ) -> Result<HashMap<i64, i64>>;

    /// Invites received since `day_start`, grouped per recipient, keeping
    /// only recipients whose latest invite lies in `[bucket_start, bucket_end)`.
    async fn load_invite_counts(
        &self,
        brand: &str,
        day_start: NaiveDateTime,
        bucket_start: NaiveDateTime,
        bucket_end: NaiveDateTime,
    ) -> Result<Vec<InviteCount>>;
}

/// Write access to the search index.
#[async_trait]
pub trait SearchIndexClientTrait: Send + Sync {
    async fn bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        refresh: bool,
    ) -> Result<BulkResponse>;

    async fn update_by_query(
        &self,
        index: &str,
        request: &UpdateByQueryRequest,
    ) -> Result<UpdateByQueryResponse>;
}

/// The store holding historical log entries.
#[async_trait]
pub trait LogStoreTrait: Send + Sync {
    /// Entries referencing `identity`, either by numeric user id or by e-mail.
    async fn find_identity_entries(
        &self,
        index: &str,
        identity: &DeletedIdentity,
    ) -> Result<Vec<LogEntry>>;

    /// Applies the rewrites and returns how many entries were updated.
    async fn apply_rewrites(&self, rewrites: &[LogEntryRewrite]) -> Result<usize>;
}
