//! Pipeline scenarios against in-memory fakes of the source, index and log store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::projector::fixtures::user_row;
use super::*;
use crate::config::SyncConfig;
use crate::errors::{Error, Result};

#[derive(Default)]
struct SourceState {
    users: BTreeMap<i64, SourceUserRow>,
    flags: BTreeSet<(i64, DirtyFlag)>,
    lookups: HashMap<i64, AuxiliaryLookups>,
    messages: HashMap<i64, i64>,
    boundary_users: Vec<(NaiveDate, i64)>,
    invites: Vec<InviteCount>,
    invite_queries: Vec<(NaiveDateTime, NaiveDateTime, NaiveDateTime)>,
    count_calls: usize,
    mark_attempts: usize,
    mark_failures_left: usize,
}

#[derive(Default)]
struct FakeSource {
    state: Mutex<SourceState>,
}

impl FakeSource {
    fn with_users(users: Vec<SourceUserRow>) -> Self {
        let source = Self::default();
        {
            let mut state = source.state.lock().unwrap();
            for user in users {
                state.users.insert(user.id, user);
            }
        }
        source
    }

    fn matches(user: &SourceUserRow, brand: &str, filter: &SelectionFilter) -> bool {
        if user.brand != brand {
            return false;
        }
        match filter {
            SelectionFilter::All => true,
            SelectionFilter::Enabled => user.active && !user.disabled,
            SelectionFilter::SyncedBefore(cutoff) => {
                user.last_synced_at.map_or(true, |synced| synced < *cutoff)
            }
            SelectionFilter::ActiveSince(cutoff) => {
                !user.disabled && user.last_active_at.is_some_and(|active| active >= *cutoff)
            }
            SelectionFilter::Ids(ids) => ids.contains(&user.id),
        }
    }

    fn user(&self, id: i64) -> SourceUserRow {
        self.state.lock().unwrap().users[&id].clone()
    }
}

#[async_trait]
impl SearchSourceRepositoryTrait for FakeSource {
    async fn count_users(&self, brand: &str, filter: &SelectionFilter) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        state.count_calls += 1;
        Ok(state
            .users
            .values()
            .filter(|user| Self::matches(user, brand, filter))
            .count() as i64)
    }

    async fn load_users(
        &self,
        brand: &str,
        filter: &SelectionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SourceUserRow>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .values()
            .filter(|user| Self::matches(user, brand, filter))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn load_auxiliary_lookups(
        &self,
        user_ids: &[i64],
        _messages_since: NaiveDateTime,
    ) -> Result<HashMap<i64, AuxiliaryLookups>> {
        let state = self.state.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| state.lookups.get(id).map(|lookups| (*id, *lookups)))
            .collect())
    }

    async fn mark_synced(&self, user_ids: &[i64], reconciliation: Reconciliation) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.mark_attempts += 1;
        if state.mark_failures_left > 0 {
            state.mark_failures_left -= 1;
            return Err(Error::Database(crate::errors::DatabaseError::QueryFailed(
                "database is locked".to_string(),
            )));
        }
        for id in user_ids {
            match reconciliation {
                Reconciliation::FullDocument { synced_at } => {
                    if let Some(user) = state.users.get_mut(id) {
                        user.last_synced_at = Some(synced_at);
                    }
                    state.flags.retain(|(flagged, _)| flagged != id);
                }
                Reconciliation::DirtyFlag(flag) => {
                    state.flags.remove(&(*id, flag));
                }
            }
        }
        Ok(user_ids.len())
    }

    async fn load_flagged_user_ids(
        &self,
        _brand: &str,
        flag: DirtyFlag,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .flags
            .iter()
            .filter(|(id, flagged)| {
                *flagged == flag && state.users.get(id).is_some_and(|user| !user.deleted)
            })
            .map(|(id, _)| *id)
            .take(limit as usize)
            .collect())
    }

    async fn load_message_boundary_user_ids(
        &self,
        _brand: &str,
        boundary: NaiveDate,
    ) -> Result<Vec<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .boundary_users
            .iter()
            .filter(|(date, _)| *date == boundary)
            .map(|(_, id)| *id)
            .collect())
    }

    async fn count_messages_received(
        &self,
        user_ids: &[i64],
        _since: NaiveDateTime,
    ) -> Result<HashMap<i64, i64>> {
        let state = self.state.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| state.messages.get(id).map(|count| (*id, *count)))
            .collect())
    }

    async fn load_invite_counts(
        &self,
        _brand: &str,
        day_start: NaiveDateTime,
        bucket_start: NaiveDateTime,
        bucket_end: NaiveDateTime,
    ) -> Result<Vec<InviteCount>> {
        let mut state = self.state.lock().unwrap();
        state
            .invite_queries
            .push((day_start, bucket_start, bucket_end));
        Ok(state.invites.clone())
    }
}

/// Index with Elasticsearch merge semantics for upserts.
#[derive(Default)]
struct FakeIndex {
    documents: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    calls: Mutex<Vec<Vec<BulkOperation>>>,
    /// 1-based bulk call that gets an item-level rejection.
    fail_on_call: Option<usize>,
}

impl FakeIndex {
    fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    fn put(&self, index: &str, id: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    fn snapshot(&self, index: &str) -> BTreeMap<String, Value> {
        self.documents
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    fn calls(&self) -> Vec<Vec<BulkOperation>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndexClientTrait for FakeIndex {
    async fn bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        _refresh: bool,
    ) -> Result<BulkResponse> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(operations.to_vec());
            calls.len()
        };
        if self.fail_on_call == Some(call) {
            return Ok(BulkResponse {
                took: 1,
                errors: true,
                items: vec![BulkItemResult {
                    action: "update".to_string(),
                    id: operations[0].id().to_string(),
                    status: 400,
                    result: None,
                    error: Some(json!({
                        "type": "mapper_parsing_exception",
                        "reason": "failed to parse field [location]"
                    })),
                }],
            });
        }

        let mut documents = self.documents.lock().unwrap();
        let documents = documents.entry(index.to_string()).or_default();
        let mut items = Vec::new();
        for operation in operations {
            match operation {
                BulkOperation::Index {
                    id,
                    document,
                    upsert,
                    ..
                } => {
                    let target = documents.entry(id.clone()).or_insert_with(|| json!({}));
                    if !*upsert {
                        *target = json!({});
                    }
                    if let (Some(target), Some(fields)) = (target.as_object_mut(), document.as_object()) {
                        for (key, value) in fields {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                    items.push(BulkItemResult {
                        action: "update".to_string(),
                        id: id.clone(),
                        status: 200,
                        result: Some("updated".to_string()),
                        error: None,
                    });
                }
                BulkOperation::Delete { id } => {
                    let found = documents.remove(id).is_some();
                    items.push(BulkItemResult {
                        action: "delete".to_string(),
                        id: id.clone(),
                        status: if found { 200 } else { 404 },
                        result: Some(if found { "deleted" } else { "not_found" }.to_string()),
                        error: None,
                    });
                }
            }
        }
        Ok(BulkResponse {
            took: 1,
            errors: false,
            items,
        })
    }

    async fn update_by_query(
        &self,
        index: &str,
        request: &UpdateByQueryRequest,
    ) -> Result<UpdateByQueryResponse> {
        assert_eq!(request.conflicts, ConflictPolicy::Proceed);
        let mut documents = self.documents.lock().unwrap();
        let mut updated = 0;
        for document in documents.entry(index.to_string()).or_default().values_mut() {
            let has_counter = document
                .get(INVITES_TODAY_FIELD)
                .and_then(Value::as_i64)
                .is_some_and(|count| count >= 0);
            if has_counter {
                document[INVITES_TODAY_FIELD] = json!(0);
                updated += 1;
            }
        }
        Ok(UpdateByQueryResponse {
            total: updated,
            updated,
            version_conflicts: 0,
            failures: vec![],
        })
    }
}

#[derive(Default)]
struct FakeLogStore {
    entries: Mutex<Vec<LogEntry>>,
    unavailable: bool,
    /// Time each lookup takes.
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeLogStore {
    fn with_entries(entries: Vec<(&str, Value)>) -> Self {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(id, source)| LogEntry {
                        index: "logs_nl".to_string(),
                        id: id.to_string(),
                        source: source.as_object().cloned().unwrap(),
                    })
                    .collect(),
            ),
            ..Self::default()
        }
    }

    fn entry(&self, id: &str) -> Value {
        let entries = self.entries.lock().unwrap();
        let entry = entries.iter().find(|entry| entry.id == id).unwrap();
        Value::Object(entry.source.clone())
    }
}

#[async_trait]
impl LogStoreTrait for FakeLogStore {
    async fn find_identity_entries(
        &self,
        _index: &str,
        identity: &DeletedIdentity,
    ) -> Result<Vec<LogEntry>> {
        if self.unavailable {
            return Err(Error::LogStore("connection refused".to_string()));
        }
        if !self.delay.is_zero() {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|entry| {
                entry.user_id() == Some(identity.id)
                    || entry.source.get("email").and_then(Value::as_str) == Some(identity.email.as_str())
            })
            .cloned()
            .collect())
    }

    async fn apply_rewrites(&self, rewrites: &[LogEntryRewrite]) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap();
        for rewrite in rewrites {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.id == rewrite.id) {
                if let Some(user_id) = rewrite.user_id {
                    entry.source.insert(LOG_USER_ID_FIELD.to_string(), json!(user_id));
                }
                for field in &rewrite.redact {
                    entry
                        .source
                        .insert(field.clone(), json!(REDACTED_PLACEHOLDER));
                }
            }
        }
        Ok(rewrites.len())
    }
}

const USERS: &str = "users_nl";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 10)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap()
}

fn test_config() -> SyncConfig {
    SyncConfig {
        page_size: 2,
        page_delay_ms: 0,
        reconcile_retry_delay_ms: 0,
        ..SyncConfig::default()
    }
}

fn engine(
    source: &Arc<FakeSource>,
    index: &Arc<FakeIndex>,
    logs: &Arc<FakeLogStore>,
) -> SearchSyncEngine {
    SearchSyncEngine::new(
        source.clone(),
        index.clone(),
        logs.clone(),
        test_config(),
    )
}

fn deleted_user(id: i64) -> SourceUserRow {
    let mut user = user_row(id);
    user.deleted = true;
    user
}

#[tokio::test]
async fn two_page_run_writes_live_users_and_removes_deleted_one() {
    let source = Arc::new(FakeSource::with_users(vec![
        user_row(1),
        user_row(2),
        user_row(3),
        deleted_user(4),
    ]));
    let index = Arc::new(FakeIndex::default());
    index.put(USERS, "4", json!({"id": 4, "first_name": "First4"}));
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::All), now(), Some(tx))
        .await
        .expect("sync succeeds");

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.cleanup_scheduled, 1);

    let calls = index.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].iter().all(|op| !op.is_delete()));
    assert_eq!(calls[0].len(), 2);
    assert_eq!(calls[1].len(), 2);
    assert!(!calls[1][0].is_delete());
    assert_eq!(calls[1][1], BulkOperation::delete("4"));

    let documents = index.snapshot(USERS);
    assert_eq!(documents.keys().collect::<Vec<_>>(), ["1", "2", "3"]);
    assert_eq!(documents["2"]["first_name"], "First2");
    assert_eq!(documents["3"]["location"], json!({"lat": 52.09, "lon": 5.12}));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            SyncProgressEvent::Started {
                total_rows: 4,
                total_pages: 2
            },
            SyncProgressEvent::PageCompleted {
                page_index: 0,
                total_pages: 2,
                rows: 2
            },
            SyncProgressEvent::PageCompleted {
                page_index: 1,
                total_pages: 2,
                rows: 2
            },
        ]
    );
}

#[tokio::test]
async fn second_full_sync_leaves_index_unchanged() {
    let source = Arc::new(FakeSource::with_users(vec![
        user_row(1),
        user_row(2),
        deleted_user(3),
    ]));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);
    let request = SyncRequest::new("nl", SyncMode::All);

    engine.sync_users_at(&request, now(), None).await.expect("first run");
    let first = index.snapshot(USERS);
    engine
        .sync_users_at(&request, now() + chrono::TimeDelta::hours(1), None)
        .await
        .expect("second run");

    assert_eq!(index.snapshot(USERS), first);
    assert!(!first.contains_key("3"));
}

#[tokio::test]
async fn resync_clears_location_once_coordinates_are_removed() {
    let source = Arc::new(FakeSource::with_users(vec![user_row(1)]));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);
    let request = SyncRequest::new("nl", SyncMode::All);

    engine.sync_users_at(&request, now(), None).await.expect("first run");
    assert_eq!(
        index.snapshot(USERS)["1"]["location"],
        json!({"lat": 52.09, "lon": 5.12})
    );

    {
        let mut state = source.state.lock().unwrap();
        let user = state.users.get_mut(&1).unwrap();
        user.latitude = None;
        user.longitude = None;
    }
    engine
        .sync_users_at(&request, now() + chrono::TimeDelta::hours(1), None)
        .await
        .expect("second run");

    let documents = index.snapshot(USERS);
    assert_eq!(documents["1"].get("location"), Some(&Value::Null));
    assert_eq!(documents["1"]["first_name"], "First1");
}

#[tokio::test]
async fn outdated_mode_drains_the_eligible_set() {
    let mut users: Vec<_> = (1..=5).map(user_row).collect();
    users[4].last_synced_at = Some(now());
    users.push(user_row(6));
    let source = Arc::new(FakeSource::with_users(users));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::Outdated), now(), None)
        .await
        .expect("sync succeeds");

    // Users 1-4 and 6 were eligible: three pages of two.
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.indexed, 5);
    let cutoff = now() - test_config().outdated_after();
    let remaining = source
        .count_users("nl", &SelectionFilter::SyncedBefore(cutoff))
        .await
        .expect("count");
    assert_eq!(remaining, 0);
    assert!(!index.snapshot(USERS).contains_key("5"));
}

#[tokio::test]
async fn outdated_mode_stops_when_reconciliation_keeps_failing() {
    let source = Arc::new(FakeSource::with_users((1..=3).map(user_row).collect()));
    source.state.lock().unwrap().mark_failures_left = usize::MAX;
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::Outdated), now(), None)
        .await
        .expect("reconciliation failures are not fatal");

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.reconcile_failures, 4);
    assert_eq!(source.state.lock().unwrap().mark_attempts, 4);
}

#[tokio::test]
async fn reconciliation_is_retried_once() {
    let source = Arc::new(FakeSource::with_users(vec![user_row(1)]));
    source.state.lock().unwrap().mark_failures_left = 1;
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::All), now(), None)
        .await
        .expect("sync succeeds");

    assert_eq!(summary.reconcile_failures, 0);
    assert_eq!(source.state.lock().unwrap().mark_attempts, 2);
    assert_eq!(source.user(1).last_synced_at, Some(now()));
}

#[tokio::test]
async fn bulk_rejection_on_second_page_aborts_run() {
    let source = Arc::new(FakeSource::with_users((1..=6).map(user_row).collect()));
    let index = Arc::new(FakeIndex::failing_on(2));
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let err = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::All), now(), None)
        .await
        .expect_err("run must fail");

    match err {
        Error::BulkRejected {
            index: name,
            failed,
            payload,
        } => {
            assert_eq!(name, USERS);
            assert_eq!(failed, 1);
            assert!(payload.contains("mapper_parsing_exception"));
            assert!(payload.contains("failed to parse field [location]"));
        }
        other => panic!("expected bulk rejection, got {:?}", other),
    }

    assert_eq!(index.calls().len(), 2);
    assert_eq!(index.snapshot(USERS).keys().collect::<Vec<_>>(), ["1", "2"]);
    assert_eq!(source.user(2).last_synced_at, Some(now()));
    assert_eq!(source.user(3).last_synced_at, None);
}

#[tokio::test]
async fn explicit_ids_skip_the_count_query() {
    let source = Arc::new(FakeSource::with_users((1..=4).map(user_row).collect()));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .sync_users_at(
            &SyncRequest::new("nl", SyncMode::ExplicitIds(vec![3, 1, 3])),
            now(),
            None,
        )
        .await
        .expect("sync succeeds");

    assert_eq!(summary.pages, 1);
    assert_eq!(source.state.lock().unwrap().count_calls, 0);
    assert_eq!(index.snapshot(USERS).keys().collect::<Vec<_>>(), ["1", "3"]);
}

#[tokio::test]
async fn empty_selection_writes_nothing() {
    let mut disabled = user_row(1);
    disabled.disabled = true;
    let source = Arc::new(FakeSource::with_users(vec![disabled]));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::Enabled), now(), None)
        .await
        .expect("empty selection is fine");

    assert_eq!(summary.pages, 0);
    assert!(index.calls().is_empty());
}

#[tokio::test]
async fn blank_brand_is_rejected() {
    let source = Arc::new(FakeSource::default());
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let err = engine
        .sync_users(&SyncRequest::new("  ", SyncMode::All), None)
        .await
        .expect_err("blank brand");
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[tokio::test]
async fn deleted_users_get_their_logs_cleaned() {
    let source = Arc::new(FakeSource::with_users(vec![user_row(1), deleted_user(2)]));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore::with_entries(vec![
        (
            "by-email",
            json!({"email": "user2@example.org", "message": "Welcome First2 Last2"}),
        ),
        ("other", json!({"email": "user1@example.org", "message": "hi"})),
    ]));
    let engine = engine(&source, &index, &logs);

    engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::All), now(), None)
        .await
        .expect("sync succeeds");
    let outcomes = engine.wait_for_cleanups().await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_done());
    assert_eq!(
        logs.entry("by-email"),
        json!({"email": REDACTED_PLACEHOLDER, "message": REDACTED_PLACEHOLDER, "user_id": 2})
    );
    assert_eq!(logs.entry("other")["email"], "user1@example.org");
}

#[tokio::test]
async fn failing_log_cleanup_does_not_fail_the_sync() {
    let source = Arc::new(FakeSource::with_users(vec![deleted_user(1)]));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore {
        unavailable: true,
        ..FakeLogStore::default()
    });
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::All), now(), None)
        .await
        .expect("cleanup failures are swallowed");
    assert_eq!(summary.deleted, 1);

    let outcomes = engine.wait_for_cleanups().await;
    assert!(matches!(outcomes[0].failure(), Some(Error::LogStore(_))));
}

#[tokio::test]
async fn log_cleanups_wait_for_a_free_slot() {
    let source = Arc::new(FakeSource::with_users((1..=6).map(deleted_user).collect()));
    let index = Arc::new(FakeIndex::default());
    let logs = Arc::new(FakeLogStore {
        delay: Duration::from_millis(20),
        ..FakeLogStore::default()
    });
    let engine = SearchSyncEngine::new(
        source.clone(),
        index.clone(),
        logs.clone(),
        SyncConfig {
            max_concurrent_cleanups: 1,
            ..test_config()
        },
    );

    let summary = engine
        .sync_users_at(&SyncRequest::new("nl", SyncMode::All), now(), None)
        .await
        .expect("sync succeeds");
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.cleanup_scheduled, 6);

    let outcomes = engine.wait_for_cleanups().await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(BestEffort::is_done));
    assert_eq!(logs.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn message_counts_merge_into_documents_and_clear_flags() {
    let source = Arc::new(FakeSource::with_users(vec![user_row(1), user_row(2), deleted_user(3)]));
    {
        let mut state = source.state.lock().unwrap();
        for id in [1, 2, 3] {
            state.flags.insert((id, DirtyFlag::Messages));
        }
        state.messages.insert(1, 5);
    }
    let index = Arc::new(FakeIndex::default());
    index.put(USERS, "1", json!({"id": 1, "first_name": "First1", "messages_received": 2}));
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .update_message_counts_at("nl", MessageCountMode::RecentlyUpdated, now(), false)
        .await
        .expect("update succeeds");

    assert_eq!(summary.indexed, 2);
    let documents = index.snapshot(USERS);
    assert_eq!(
        documents["1"],
        json!({"id": 1, "first_name": "First1", "messages_received": 5})
    );
    assert_eq!(documents["2"], json!({"messages_received": 0}));
    assert!(!documents.contains_key("3"));

    let state = source.state.lock().unwrap();
    assert_eq!(
        state.flags.iter().collect::<Vec<_>>(),
        [&(3, DirtyFlag::Messages)]
    );
    assert_eq!(state.users[&1].last_synced_at, None);
}

#[tokio::test]
async fn outdated_message_counts_reset_users_at_window_boundary() {
    let source = Arc::new(FakeSource::with_users(vec![user_row(1), user_row(2)]));
    {
        let mut state = source.state.lock().unwrap();
        state.boundary_users.push((NaiveDate::from_ymd_opt(2024, 5, 11).unwrap(), 1));
        state.boundary_users.push((NaiveDate::from_ymd_opt(2024, 5, 12).unwrap(), 2));
        state.flags.insert((1, DirtyFlag::Messages));
    }
    let index = Arc::new(FakeIndex::default());
    index.put(USERS, "1", json!({"messages_received": 1}));
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    engine
        .update_message_counts_at("nl", MessageCountMode::Outdated, now(), false)
        .await
        .expect("update succeeds");

    let documents = index.snapshot(USERS);
    assert_eq!(documents["1"]["messages_received"], 0);
    assert!(!documents.contains_key("2"));
    // The outdated pass never touches flags.
    assert!(source
        .state
        .lock()
        .unwrap()
        .flags
        .contains(&(1, DirtyFlag::Messages)));
}

#[tokio::test]
async fn invite_counts_use_the_last_closed_minute() {
    let source = Arc::new(FakeSource::default());
    source.state.lock().unwrap().invites = vec![InviteCount {
        user_id: 8,
        count: 3,
        latest_at: now() - chrono::TimeDelta::seconds(20),
    }];
    let index = Arc::new(FakeIndex::default());
    index.put(USERS, "8", json!({"id": 8, "invites_today": 2}));
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let summary = engine
        .update_invite_counts_at("nl", now() + chrono::TimeDelta::seconds(15), false)
        .await
        .expect("update succeeds");

    assert_eq!(summary.indexed, 1);
    assert_eq!(index.snapshot(USERS)["8"], json!({"id": 8, "invites_today": 3}));
    let queries = source.state.lock().unwrap().invite_queries.clone();
    let midnight = now().date().and_hms_opt(0, 0, 0).unwrap();
    assert_eq!(
        queries,
        vec![(midnight, now() - chrono::TimeDelta::seconds(60), now())]
    );
}

#[tokio::test]
async fn counter_reset_only_touches_documents_with_the_counter() {
    let source = Arc::new(FakeSource::default());
    let index = Arc::new(FakeIndex::default());
    index.put(USERS, "1", json!({"id": 1, "invites_today": 4}));
    index.put(USERS, "2", json!({"id": 2, "invites_today": 0}));
    index.put(USERS, "3", json!({"id": 3}));
    let logs = Arc::new(FakeLogStore::default());
    let engine = engine(&source, &index, &logs);

    let outcome = engine
        .reset_invite_counters("nl", true)
        .await
        .expect("reset succeeds");

    assert_eq!(outcome.updated, 2);
    let documents = index.snapshot(USERS);
    assert_eq!(documents["1"]["invites_today"], 0);
    assert_eq!(documents["2"]["invites_today"], 0);
    assert_eq!(documents["3"], json!({"id": 3}));
}
