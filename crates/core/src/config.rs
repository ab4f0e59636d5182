//! Sync engine configuration.
//!
//! Every knob has a named default and an environment override. The windows
//! used by the selection planner are kept here rather than inlined so that a
//! deployment can tune them without a rebuild.

use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::errors::{Error, Result};

/// Rows fetched and written per page.
pub const DEFAULT_PAGE_SIZE: i64 = 500;

/// Pause between pages when more pages remain.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 200;

/// A row is outdated when it was last synced longer ago than this.
pub const DEFAULT_OUTDATED_AFTER_SECS: i64 = 3 * 24 * 60 * 60;

/// Activity window for `ActiveRecently`.
pub const DEFAULT_ACTIVE_RECENTLY_SECS: i64 = 30 * 24 * 60 * 60;

/// Activity window for `ActiveLastMinute`. Slightly over a minute so that a
/// once-a-minute schedule never leaves a gap.
pub const DEFAULT_ACTIVE_LAST_MINUTE_SECS: i64 = 100;

/// Delay before the single reconciliation retry.
pub const DEFAULT_RECONCILE_RETRY_DELAY_MS: u64 = 1_000;

/// Per-document optimistic retry budget sent with every upsert.
pub const DEFAULT_RETRY_ON_CONFLICT: u32 = 3;

/// Rolling window for the "messages received" counter.
pub const DEFAULT_MESSAGE_WINDOW_DAYS: i64 = 30;

/// Row cap for one dirty-flag driven message-count run.
pub const DEFAULT_RECENT_MESSAGE_LIMIT: i64 = 1_000;

/// Width of the invite-count bucket.
pub const DEFAULT_INVITE_BUCKET_SECS: i64 = 60;

/// Log cleanups allowed to run against the log store at the same time.
pub const DEFAULT_MAX_CONCURRENT_CLEANUPS: usize = 2;

pub const DEFAULT_USER_INDEX_PREFIX: &str = "users_";
pub const DEFAULT_LOG_INDEX_PREFIX: &str = "logs_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub page_size: i64,
    pub page_delay_ms: u64,
    pub outdated_after_secs: i64,
    pub active_recently_secs: i64,
    pub active_last_minute_secs: i64,
    pub reconcile_retry_delay_ms: u64,
    pub retry_on_conflict: u32,
    pub message_window_days: i64,
    pub recent_message_limit: i64,
    pub invite_bucket_secs: i64,
    pub max_concurrent_cleanups: usize,
    pub user_index_prefix: String,
    pub log_index_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_delay_ms: DEFAULT_PAGE_DELAY_MS,
            outdated_after_secs: DEFAULT_OUTDATED_AFTER_SECS,
            active_recently_secs: DEFAULT_ACTIVE_RECENTLY_SECS,
            active_last_minute_secs: DEFAULT_ACTIVE_LAST_MINUTE_SECS,
            reconcile_retry_delay_ms: DEFAULT_RECONCILE_RETRY_DELAY_MS,
            retry_on_conflict: DEFAULT_RETRY_ON_CONFLICT,
            message_window_days: DEFAULT_MESSAGE_WINDOW_DAYS,
            recent_message_limit: DEFAULT_RECENT_MESSAGE_LIMIT,
            invite_bucket_secs: DEFAULT_INVITE_BUCKET_SECS,
            max_concurrent_cleanups: DEFAULT_MAX_CONCURRENT_CLEANUPS,
            user_index_prefix: DEFAULT_USER_INDEX_PREFIX.to_string(),
            log_index_prefix: DEFAULT_LOG_INDEX_PREFIX.to_string(),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, current: T) -> Result<T> {
    match env_value(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::config(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(current),
    }
}

impl SyncConfig {
    /// Build a config from defaults overridden by `SEARCH_SYNC_*` variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            page_size: env_parsed("SEARCH_SYNC_PAGE_SIZE", defaults.page_size)?,
            page_delay_ms: env_parsed("SEARCH_SYNC_PAGE_DELAY_MS", defaults.page_delay_ms)?,
            outdated_after_secs: env_parsed(
                "SEARCH_SYNC_OUTDATED_AFTER_SECS",
                defaults.outdated_after_secs,
            )?,
            active_recently_secs: env_parsed(
                "SEARCH_SYNC_ACTIVE_RECENTLY_SECS",
                defaults.active_recently_secs,
            )?,
            active_last_minute_secs: env_parsed(
                "SEARCH_SYNC_ACTIVE_LAST_MINUTE_SECS",
                defaults.active_last_minute_secs,
            )?,
            reconcile_retry_delay_ms: env_parsed(
                "SEARCH_SYNC_RECONCILE_RETRY_DELAY_MS",
                defaults.reconcile_retry_delay_ms,
            )?,
            retry_on_conflict: env_parsed(
                "SEARCH_SYNC_RETRY_ON_CONFLICT",
                defaults.retry_on_conflict,
            )?,
            message_window_days: env_parsed(
                "SEARCH_SYNC_MESSAGE_WINDOW_DAYS",
                defaults.message_window_days,
            )?,
            recent_message_limit: env_parsed(
                "SEARCH_SYNC_RECENT_MESSAGE_LIMIT",
                defaults.recent_message_limit,
            )?,
            invite_bucket_secs: env_parsed(
                "SEARCH_SYNC_INVITE_BUCKET_SECS",
                defaults.invite_bucket_secs,
            )?,
            max_concurrent_cleanups: env_parsed(
                "SEARCH_SYNC_MAX_CONCURRENT_CLEANUPS",
                defaults.max_concurrent_cleanups,
            )?,
            user_index_prefix: env_value("SEARCH_SYNC_USER_INDEX_PREFIX")
                .unwrap_or(defaults.user_index_prefix),
            log_index_prefix: env_value("SEARCH_SYNC_LOG_INDEX_PREFIX")
                .unwrap_or(defaults.log_index_prefix),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size <= 0 {
            return Err(Error::config("page size must be positive"));
        }
        if self.outdated_after_secs < 0
            || self.active_recently_secs < 0
            || self.active_last_minute_secs < 0
        {
            return Err(Error::config("selection windows must not be negative"));
        }
        if self.message_window_days <= 0 {
            return Err(Error::config("message window must be at least one day"));
        }
        if self.invite_bucket_secs <= 0 {
            return Err(Error::config("invite bucket must be positive"));
        }
        if self.max_concurrent_cleanups == 0 {
            return Err(Error::config("at least one log cleanup must be allowed to run"));
        }
        Ok(())
    }

    pub fn user_index(&self, brand: &str) -> String {
        format!("{}{}", self.user_index_prefix, brand)
    }

    pub fn log_index(&self, brand: &str) -> String {
        format!("{}{}", self.log_index_prefix, brand)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn reconcile_retry_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_retry_delay_ms)
    }

    pub fn outdated_after(&self) -> TimeDelta {
        TimeDelta::seconds(self.outdated_after_secs)
    }

    pub fn active_recently(&self) -> TimeDelta {
        TimeDelta::seconds(self.active_recently_secs)
    }

    pub fn active_last_minute(&self) -> TimeDelta {
        TimeDelta::seconds(self.active_last_minute_secs)
    }

    pub fn message_window(&self) -> TimeDelta {
        TimeDelta::days(self.message_window_days)
    }

    pub fn invite_bucket(&self) -> TimeDelta {
        TimeDelta::seconds(self.invite_bucket_secs)
    }
}
