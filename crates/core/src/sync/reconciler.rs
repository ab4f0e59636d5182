//! Post-sync bookkeeping against the source of record.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::best_effort::BestEffort;
use super::log_cleanup::clean_identity_logs;
use super::sync_model::{DeletedIdentity, Reconciliation};
use super::sync_traits::{LogStoreTrait, SearchSourceRepositoryTrait};

pub struct PostSyncReconciler {
    repository: Arc<dyn SearchSourceRepositoryTrait>,
    log_store: Arc<dyn LogStoreTrait>,
    retry_delay: Duration,
    /// One permit per cleanup allowed to talk to the log store.
    cleanup_slots: Arc<Semaphore>,
}

impl PostSyncReconciler {
    pub fn new(
        repository: Arc<dyn SearchSourceRepositoryTrait>,
        log_store: Arc<dyn LogStoreTrait>,
        retry_delay: Duration,
        max_concurrent_cleanups: usize,
    ) -> Self {
        Self {
            repository,
            log_store,
            retry_delay,
            cleanup_slots: Arc::new(Semaphore::new(max_concurrent_cleanups.max(1))),
        }
    }

    /// Writes `reconciliation` for the ids of a page that is already in the
    /// index. One retry after `retry_delay`, then the failure is dropped.
    pub async fn reconcile(&self, user_ids: &[i64], reconciliation: Reconciliation) -> BestEffort<usize> {
        if user_ids.is_empty() {
            return BestEffort::Done(0);
        }

        match self.repository.mark_synced(user_ids, reconciliation).await {
            Ok(updated) => return BestEffort::Done(updated),
            Err(err) => warn!(
                "[SearchSync] Reconciling {} user(s) failed, retrying in {}ms: {}",
                user_ids.len(),
                self.retry_delay.as_millis(),
                err
            ),
        }

        tokio::time::sleep(self.retry_delay).await;
        let outcome = BestEffort::from(self.repository.mark_synced(user_ids, reconciliation).await);
        if let Some(err) = outcome.failure() {
            warn!(
                "[SearchSync] Giving up reconciling {} user(s): {}",
                user_ids.len(),
                err
            );
        }
        outcome
    }

    /// Starts log cleanup for identities removed from the index. The task is
    /// detached from the run; the handle is only for callers that want to
    /// wait for it. Tasks queue on the cleanup slots, so at most
    /// `max_concurrent_cleanups` of them query the log store at once.
    pub fn cleanup_deleted(
        &self,
        log_index: String,
        identities: Vec<DeletedIdentity>,
    ) -> Option<JoinHandle<BestEffort<usize>>> {
        if identities.is_empty() {
            return None;
        }
        let log_store = Arc::clone(&self.log_store);
        let slots = Arc::clone(&self.cleanup_slots);
        Some(tokio::spawn(async move {
            if slots.available_permits() == 0 {
                debug!(
                    "[LogCleanup] Cleanup of {} user(s) waiting for a free slot",
                    identities.len()
                );
            }
            // The semaphore is never closed.
            let _permit = slots.acquire_owned().await.ok();
            clean_identity_logs(log_store.as_ref(), &log_index, &identities).await
        }))
    }
}
