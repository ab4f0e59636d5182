//! Orchestration of the search sync pipelines.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use log::{debug, info};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::best_effort::BestEffort;
use super::executor::BulkExecutor;
use super::incremental::{
    counter_reset_request, invite_window, message_boundary_date, InviteCountHandler,
    MessageCountHandler,
};
use super::pager::{PageHandler, Pager, SyncCursor};
use super::planner::SelectionPlanner;
use super::projector::project;
use super::reconciler::PostSyncReconciler;
use super::sync_model::{
    CounterResetOutcome, DeletedIdentity, DirtyFlag, MessageCountMode, Reconciliation,
    SourceUserRow, SyncProgressEvent, SyncRequest, SyncSummary,
};
use super::sync_traits::{LogStoreTrait, SearchIndexClientTrait, SearchSourceRepositoryTrait};
use super::translator::translate;
use crate::config::SyncConfig;
use crate::errors::{Error, Result};

type CleanupHandle = JoinHandle<BestEffort<usize>>;

/// Full-document page handler: project, write, reconcile, schedule cleanup.
struct UserPageHandler<'a> {
    repository: &'a dyn SearchSourceRepositoryTrait,
    executor: BulkExecutor<'a>,
    reconciler: &'a PostSyncReconciler,
    config: &'a SyncConfig,
    log_index: String,
    now: NaiveDateTime,
    summary: SyncSummary,
    cleanups: Vec<CleanupHandle>,
}

#[async_trait]
impl PageHandler<SourceUserRow> for UserPageHandler<'_> {
    async fn handle_page(&mut self, cursor: &SyncCursor, rows: Vec<SourceUserRow>) -> Result<()> {
        let user_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let lookups = self
            .repository
            .load_auxiliary_lookups(&user_ids, self.now - self.config.message_window())
            .await?;

        let documents: Vec<_> = rows
            .iter()
            .map(|row| project(row, &lookups.get(&row.id).copied().unwrap_or_default()))
            .collect();
        let operations = translate(&documents, self.config.retry_on_conflict)?;

        let outcome = self.executor.execute(&operations).await?;
        self.summary.indexed += outcome.indexed;
        self.summary.deleted += outcome.deleted;
        debug!(
            "[SearchSync] Page {}/{} of '{}': {} row(s), {} indexed, {} deleted",
            cursor.page_index + 1,
            cursor.total_pages,
            self.executor.index(),
            rows.len(),
            outcome.indexed,
            outcome.deleted
        );

        let reconciled = self
            .reconciler
            .reconcile(&user_ids, Reconciliation::FullDocument { synced_at: self.now })
            .await;
        if !reconciled.is_done() {
            self.summary.reconcile_failures += user_ids.len();
        }

        let removed: Vec<DeletedIdentity> = rows
            .iter()
            .filter(|row| row.deleted)
            .map(SourceUserRow::deleted_identity)
            .collect();
        let removed_count = removed.len();
        if let Some(handle) = self
            .reconciler
            .cleanup_deleted(self.log_index.clone(), removed)
        {
            self.summary.cleanup_scheduled += removed_count;
            self.cleanups.push(handle);
        }
        Ok(())
    }
}

/// Keeps the brand-scoped user index in step with the source of record.
pub struct SearchSyncEngine {
    repository: Arc<dyn SearchSourceRepositoryTrait>,
    index: Arc<dyn SearchIndexClientTrait>,
    reconciler: PostSyncReconciler,
    config: SyncConfig,
    pending_cleanups: Mutex<Vec<CleanupHandle>>,
}

impl SearchSyncEngine {
    pub fn new(
        repository: Arc<dyn SearchSourceRepositoryTrait>,
        index: Arc<dyn SearchIndexClientTrait>,
        log_store: Arc<dyn LogStoreTrait>,
        config: SyncConfig,
    ) -> Self {
        let reconciler = PostSyncReconciler::new(
            Arc::clone(&repository),
            log_store,
            config.reconcile_retry_delay(),
            config.max_concurrent_cleanups,
        );
        Self {
            repository,
            index,
            reconciler,
            config,
            pending_cleanups: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn check_brand(&self, brand: &str) -> Result<()> {
        self.config.validate()?;
        if brand.trim().is_empty() {
            return Err(Error::invalid_request("brand must not be empty"));
        }
        Ok(())
    }

    fn pending(&self) -> MutexGuard<'_, Vec<CleanupHandle>> {
        match self.pending_cleanups.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn keep_cleanups(&self, handles: Vec<CleanupHandle>) {
        if handles.is_empty() {
            return;
        }
        let mut pending = self.pending();
        pending.retain(|handle| !handle.is_finished());
        pending.extend(handles);
    }

    /// Waits for every log cleanup started so far.
    pub async fn wait_for_cleanups(&self) -> Vec<BestEffort<usize>> {
        let handles: Vec<CleanupHandle> = self.pending().drain(..).collect();
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => outcomes.push(BestEffort::Failed(Error::LogStore(format!(
                    "cleanup task did not finish: {}",
                    err
                )))),
            }
        }
        outcomes
    }

    pub async fn sync_users(
        &self,
        request: &SyncRequest,
        progress: Option<UnboundedSender<SyncProgressEvent>>,
    ) -> Result<SyncSummary> {
        self.sync_users_at(request, Utc::now().naive_utc(), progress)
            .await
    }

    /// Full-document sync of the users selected by `request.mode`, as of `now`.
    ///
    /// Pages run strictly one after the other. A failed bulk write or source
    /// query aborts the run; pages already written stay in the index.
    pub async fn sync_users_at(
        &self,
        request: &SyncRequest,
        now: NaiveDateTime,
        progress: Option<UnboundedSender<SyncProgressEvent>>,
    ) -> Result<SyncSummary> {
        self.check_brand(&request.brand)?;
        let started = Instant::now();
        let index = self.config.user_index(&request.brand);
        let plan = SelectionPlanner::new(&self.config).plan(&request.mode, now);
        info!(
            "[SearchSync] Starting '{}' sync of '{}' (refresh={})",
            request.mode.name(),
            index,
            request.refresh
        );

        let mut handler = UserPageHandler {
            repository: self.repository.as_ref(),
            executor: BulkExecutor::new(self.index.as_ref(), &index, request.refresh),
            reconciler: &self.reconciler,
            config: &self.config,
            log_index: self.config.log_index(&request.brand),
            now,
            summary: SyncSummary::default(),
            cleanups: Vec::new(),
        };
        let pages = Pager::new(self.repository.as_ref(), &self.config)
            .with_progress(progress)
            .for_each_page(&request.brand, &plan, &mut handler)
            .await;
        // Cleanups of pages that made it into the index survive a later failure.
        self.keep_cleanups(std::mem::take(&mut handler.cleanups));

        let mut summary = handler.summary;
        summary.pages = pages?;
        summary.duration_ms = started.elapsed().as_millis() as i64;
        info!(
            "[SearchSync] Finished '{}' sync of '{}': {} page(s), {} indexed, {} deleted, {} unreconciled, {}ms",
            request.mode.name(),
            index,
            summary.pages,
            summary.indexed,
            summary.deleted,
            summary.reconcile_failures,
            summary.duration_ms
        );
        Ok(summary)
    }

    pub async fn update_message_counts(
        &self,
        brand: &str,
        mode: MessageCountMode,
        refresh: bool,
    ) -> Result<SyncSummary> {
        self.update_message_counts_at(brand, mode, Utc::now().naive_utc(), refresh)
            .await
    }

    /// Rewrites `messages_received` only, leaving the rest of each document alone.
    pub async fn update_message_counts_at(
        &self,
        brand: &str,
        mode: MessageCountMode,
        now: NaiveDateTime,
        refresh: bool,
    ) -> Result<SyncSummary> {
        self.check_brand(brand)?;
        let started = Instant::now();
        let index = self.config.user_index(brand);
        let window = self.config.message_window();

        let user_ids = match mode {
            MessageCountMode::RecentlyUpdated => {
                self.repository
                    .load_flagged_user_ids(brand, DirtyFlag::Messages, self.config.recent_message_limit)
                    .await?
            }
            MessageCountMode::Outdated => {
                self.repository
                    .load_message_boundary_user_ids(brand, message_boundary_date(now, window))
                    .await?
            }
        };
        info!(
            "[SearchSync] Updating message counts of {} user(s) in '{}' ({:?})",
            user_ids.len(),
            index,
            mode
        );

        let mut handler = MessageCountHandler {
            repository: self.repository.as_ref(),
            executor: BulkExecutor::new(self.index.as_ref(), &index, refresh),
            reconciler: &self.reconciler,
            since: now - window,
            retry_on_conflict: self.config.retry_on_conflict,
            clear_flag: mode == MessageCountMode::RecentlyUpdated,
            summary: SyncSummary::default(),
        };
        let pages = Pager::new(self.repository.as_ref(), &self.config)
            .for_each_chunk(user_ids, &mut handler)
            .await?;

        let mut summary = handler.summary;
        summary.pages = pages;
        summary.duration_ms = started.elapsed().as_millis() as i64;
        Ok(summary)
    }

    pub async fn update_invite_counts(&self, brand: &str, refresh: bool) -> Result<SyncSummary> {
        self.update_invite_counts_at(brand, Utc::now().naive_utc(), refresh)
            .await
    }

    /// Rewrites `invites_today` for users whose latest invite fell in the
    /// bucket that closed last.
    pub async fn update_invite_counts_at(
        &self,
        brand: &str,
        now: NaiveDateTime,
        refresh: bool,
    ) -> Result<SyncSummary> {
        self.check_brand(brand)?;
        let started = Instant::now();
        let index = self.config.user_index(brand);
        let window = invite_window(now, self.config.invite_bucket())?;

        let counts = self
            .repository
            .load_invite_counts(brand, window.day_start, window.bucket_start, window.bucket_end)
            .await?;
        debug!(
            "[SearchSync] {} user(s) with invites between {} and {}",
            counts.len(),
            window.bucket_start,
            window.bucket_end
        );

        let mut handler = InviteCountHandler {
            executor: BulkExecutor::new(self.index.as_ref(), &index, refresh),
            retry_on_conflict: self.config.retry_on_conflict,
            summary: SyncSummary::default(),
        };
        let pages = Pager::new(self.repository.as_ref(), &self.config)
            .for_each_chunk(counts, &mut handler)
            .await?;

        let mut summary = handler.summary;
        summary.pages = pages;
        summary.duration_ms = started.elapsed().as_millis() as i64;
        Ok(summary)
    }

    /// Zeroes `invites_today` index-wide at the start of a new day.
    pub async fn reset_invite_counters(&self, brand: &str, refresh: bool) -> Result<CounterResetOutcome> {
        self.check_brand(brand)?;
        let index = self.config.user_index(brand);
        let response = self
            .index
            .update_by_query(&index, &counter_reset_request(refresh))
            .await?;

        if !response.failures.is_empty() {
            return Err(Error::SearchIndex(format!(
                "counter reset on '{}' failed for {} document(s): {}",
                index,
                response.failures.len(),
                serde_json::to_string(&response.failures)?
            )));
        }
        info!(
            "[SearchSync] Reset invite counters in '{}': {} updated, {} conflicts skipped",
            index, response.updated, response.version_conflicts
        );
        Ok(CounterResetOutcome {
            updated: response.updated,
            version_conflicts: response.version_conflicts,
        })
    }
}
