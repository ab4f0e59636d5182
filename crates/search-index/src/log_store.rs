//! Log store backed by the search index's log indices.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Map, Value};

use carematch_core::sync::{
    DeletedIdentity, LogEntry, LogEntryRewrite, LogStoreTrait, Script, LOG_USER_ID_FIELD,
    REDACTED_PLACEHOLDER,
};

use crate::client::{ElasticClient, ScriptedUpdate};
use crate::error::SearchIndexError;

const SEARCH_PAGE_SIZE: usize = 500;
/// `index.max_result_window` default; from+size paging stops there.
const MAX_RESULT_WINDOW: usize = 10_000;

const REWRITE_SCRIPT: &str = "if (params.user_id != null) { ctx._source[params.user_id_field] = params.user_id; } \
for (field in params.fields) { ctx._source[field] = params.placeholder; }";

/// Query matching entries of `identity` by numeric id or by e-mail.
pub fn identity_query(identity: &DeletedIdentity) -> Value {
    let mut term = Map::new();
    term.insert(LOG_USER_ID_FIELD.to_string(), Value::from(identity.id));
    let mut should = vec![json!({ "term": term })];
    if !identity.email.trim().is_empty() {
        should.push(json!({"match_phrase": {"email": identity.email}}));
    }
    json!({"bool": {"should": should, "minimum_should_match": 1}})
}

/// Painless script carrying out one rewrite.
pub fn rewrite_script(rewrite: &LogEntryRewrite) -> Script {
    let mut params = Map::new();
    params.insert(
        "user_id".to_string(),
        rewrite.user_id.map(Value::from).unwrap_or(Value::Null),
    );
    params.insert(
        "user_id_field".to_string(),
        Value::String(LOG_USER_ID_FIELD.to_string()),
    );
    params.insert(
        "fields".to_string(),
        Value::Array(rewrite.redact.iter().cloned().map(Value::String).collect()),
    );
    params.insert(
        "placeholder".to_string(),
        Value::String(REDACTED_PLACEHOLDER.to_string()),
    );
    Script {
        source: REWRITE_SCRIPT.to_string(),
        params,
    }
}

#[derive(Debug, Clone)]
pub struct ElasticLogStore {
    client: ElasticClient,
    page_size: usize,
    refresh: bool,
}

impl ElasticLogStore {
    pub fn new(client: ElasticClient) -> Self {
        Self {
            client,
            page_size: SEARCH_PAGE_SIZE,
            refresh: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make rewritten entries visible to search immediately.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

fn log_store_error(err: SearchIndexError) -> carematch_core::Error {
    carematch_core::Error::LogStore(err.to_string())
}

#[async_trait]
impl LogStoreTrait for ElasticLogStore {
    async fn find_identity_entries(
        &self,
        index: &str,
        identity: &DeletedIdentity,
    ) -> carematch_core::Result<Vec<LogEntry>> {
        let query = identity_query(identity);
        let mut entries = Vec::new();
        let mut from = 0;
        while from < MAX_RESULT_WINDOW {
            let size = self.page_size.min(MAX_RESULT_WINDOW - from);
            let hits = self
                .client
                .search(index, &query, from, size)
                .await
                .map_err(log_store_error)?;
            let fetched = hits.len();
            entries.extend(hits.into_iter().map(|hit| LogEntry {
                index: hit.index,
                id: hit.id,
                source: hit.source,
            }));
            if fetched < size {
                return Ok(entries);
            }
            from += fetched;
        }
        warn!(
            "[LogCleanup] More than {} log entries reference user {}; the rest are left for a later run",
            MAX_RESULT_WINDOW, identity.id
        );
        Ok(entries)
    }

    async fn apply_rewrites(&self, rewrites: &[LogEntryRewrite]) -> carematch_core::Result<usize> {
        let updates: Vec<ScriptedUpdate> = rewrites
            .iter()
            .map(|rewrite| ScriptedUpdate {
                index: rewrite.index.clone(),
                id: rewrite.id.clone(),
                script: rewrite_script(rewrite),
            })
            .collect();
        let response = self
            .client
            .send_scripted_updates(&updates, self.refresh)
            .await
            .map_err(log_store_error)?;

        let failed = response.failed_items();
        if !failed.is_empty() {
            let payload: Vec<&Value> = failed.iter().filter_map(|item| item.error.as_ref()).collect();
            return Err(carematch_core::Error::LogStore(format!(
                "{} of {} log rewrite(s) failed: {}",
                failed.len(),
                updates.len(),
                serde_json::to_string(&payload)?
            )));
        }
        debug!("[LogCleanup] Applied {} log rewrite(s)", response.items.len());
        Ok(response.items.len())
    }
}
