//! Privacy cleanup of historical log entries for deleted users.
//!
//! Entries that were only findable by e-mail get the numeric user id so they
//! stay reachable once the e-mail is gone, and every field carrying personal
//! free text is replaced by [`REDACTED_PLACEHOLDER`].

use log::{debug, warn};
use serde_json::Value;

use super::best_effort::BestEffort;
use super::sync_model::DeletedIdentity;
use super::sync_traits::LogStoreTrait;
use crate::errors::Result;

pub const REDACTED_PLACEHOLDER: &str = "[redacted]";

/// Log field holding the numeric user id.
pub const LOG_USER_ID_FIELD: &str = "user_id";

/// Fields that are redacted whatever their content.
pub const PERSONAL_LOG_FIELDS: [&str; 6] =
    ["email", "name", "first_name", "last_name", "address", "phone"];

/// A stored log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub index: String,
    pub id: String,
    pub source: serde_json::Map<String, Value>,
}

impl LogEntry {
    pub fn user_id(&self) -> Option<i64> {
        self.source.get(LOG_USER_ID_FIELD).and_then(Value::as_i64)
    }
}

/// Scripted update for one log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryRewrite {
    pub index: String,
    pub id: String,
    /// Set when the entry was matched by e-mail only.
    pub user_id: Option<i64>,
    pub redact: Vec<String>,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn should_redact(key: &str, value: &Value, identity: &DeletedIdentity) -> bool {
    if key == LOG_USER_ID_FIELD {
        return false;
    }
    let Some(text) = value.as_str() else {
        return false;
    };
    if text.is_empty() || text == REDACTED_PLACEHOLDER {
        return false;
    }
    if PERSONAL_LOG_FIELDS.contains(&key) {
        return true;
    }
    contains_ignore_case(text, &identity.email)
        || identity
            .full_name()
            .is_some_and(|name| contains_ignore_case(text, &name))
}

/// Work out the rewrites for one identity. Entries already clean produce none.
pub fn plan_rewrites(identity: &DeletedIdentity, entries: &[LogEntry]) -> Vec<LogEntryRewrite> {
    entries
        .iter()
        .filter_map(|entry| {
            let user_id = match entry.user_id() {
                Some(_) => None,
                None => Some(identity.id),
            };
            let mut redact: Vec<String> = entry
                .source
                .iter()
                .filter(|(key, value)| should_redact(key, value, identity))
                .map(|(key, _)| key.clone())
                .collect();
            redact.sort();

            if user_id.is_none() && redact.is_empty() {
                return None;
            }
            Some(LogEntryRewrite {
                index: entry.index.clone(),
                id: entry.id.clone(),
                user_id,
                redact,
            })
        })
        .collect()
}

async fn clean_identities(
    store: &dyn LogStoreTrait,
    index: &str,
    identities: &[DeletedIdentity],
) -> Result<usize> {
    let mut rewritten = 0;
    for identity in identities {
        let entries = store.find_identity_entries(index, identity).await?;
        let rewrites = plan_rewrites(identity, &entries);
        if rewrites.is_empty() {
            continue;
        }
        debug!(
            "[LogCleanup] Rewriting {} of {} log entries for user {}",
            rewrites.len(),
            entries.len(),
            identity.id
        );
        rewritten += store.apply_rewrites(&rewrites).await?;
    }
    Ok(rewritten)
}

/// Clean the logs of every identity. Never fails: errors are logged and
/// reported as [`BestEffort::Failed`].
pub async fn clean_identity_logs(
    store: &dyn LogStoreTrait,
    index: &str,
    identities: &[DeletedIdentity],
) -> BestEffort<usize> {
    let outcome = BestEffort::from(clean_identities(store, index, identities).await);
    if let Some(err) = outcome.failure() {
        warn!(
            "[LogCleanup] Cleanup for {} deleted user(s) in '{}' abandoned: {}",
            identities.len(),
            index,
            err
        );
    }
    outcome
}
