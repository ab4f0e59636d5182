//! Search sync domain models.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Fixed weekday order used for every per-day field.
pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Which users are eligible for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "ids")]
pub enum SyncMode {
    All,
    Outdated,
    ActiveRecently,
    ActiveLastMinute,
    Enabled,
    ExplicitIds(Vec<i64>),
}

impl SyncMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Outdated => "outdated",
            Self::ActiveRecently => "active_recently",
            Self::ActiveLastMinute => "active_last_minute",
            Self::Enabled => "enabled",
            Self::ExplicitIds(_) => "explicit_ids",
        }
    }
}

/// One sync invocation. Built once by the trigger and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub brand: String,
    pub mode: SyncMode,
    /// Make written documents searchable before the bulk call returns.
    #[serde(default)]
    pub refresh: bool,
}

impl SyncRequest {
    pub fn new(brand: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            brand: brand.into(),
            mode,
            refresh: false,
        }
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Narrow per-user marker saying one field group needs re-projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyFlag {
    Messages,
}

impl DirtyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messages => "messages",
        }
    }
}

/// Raw per-weekday availability codes in [`WEEKDAYS`] order.
///
/// Each code is a string of `'1'` (morning), `'2'` (afternoon) and `'3'`
/// (evening) characters; `None` means nothing was recorded for that day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCodes(pub [Option<String>; 7]);

impl WeeklyCodes {
    pub fn from_days(days: [Option<&str>; 7]) -> Self {
        Self(days.map(|day| day.map(str::to_string)))
    }
}

/// Care preferences of a user, joined one-to-one onto the user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRow {
    pub occasional_care: bool,
    pub regular_care: bool,
    /// `"1"`, `"2"`, `"3"` or the `"4+"` sentinel.
    pub max_children: Option<String>,
    pub hourly_rate: Option<f64>,
    pub days: WeeklyCodes,
    pub created_at: NaiveDateTime,
}

/// A user row as loaded from the source of record, already flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUserRow {
    pub id: i64,
    pub brand: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub locale: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
    pub disabled: bool,
    pub deleted: bool,
    pub completed: bool,
    pub inappropriate: bool,
    pub invisible: bool,
    pub last_active_at: Option<NaiveDateTime>,
    pub last_synced_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
    /// Availability the user offers (sitters).
    pub availability: Option<WeeklyCodes>,
    pub preference: Option<PreferenceRow>,
}

impl SourceUserRow {
    pub fn deleted_identity(&self) -> DeletedIdentity {
        DeletedIdentity {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Per-user values computed from related tables.
///
/// Users without any related rows get the default, which is exactly the
/// "absent relation" answer: zero counts and false flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryLookups {
    pub children_count: i64,
    pub recommendation_count: i64,
    pub messages_received: i64,
    pub has_avatar: bool,
    pub has_avatar_warning: bool,
    pub premium_eligible: bool,
}

/// Identity of a user removed from the index, used for log cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedIdentity {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl DeletedIdentity {
    pub fn full_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                Some(format!("{} {}", first, last))
            }
            _ => None,
        }
    }
}

/// Invites received today by one user, with the time of the latest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCount {
    pub user_id: i64,
    pub count: i64,
    pub latest_at: NaiveDateTime,
}

/// Selection criteria understood by the source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionFilter {
    /// Every user of the brand, soft-deleted ones included.
    All,
    /// Active and not disabled.
    Enabled,
    /// Never synced, or last synced before the cutoff.
    SyncedBefore(NaiveDateTime),
    /// Active since the cutoff and not disabled.
    ActiveSince(NaiveDateTime),
    Ids(BTreeSet<i64>),
}

/// How consecutive pages are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStrategy {
    /// Stable result set: page `n` starts at `n * page_size`.
    Offset,
    /// Rows leave the result set once synced: always read from the start.
    RequeryUntilEmpty,
}

/// Output of the selection planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub filter: SelectionFilter,
    pub paging: PagingStrategy,
    /// Known row total; when set no count query is issued.
    pub known_total: Option<i64>,
}

/// What a reconciliation writes back to the source of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The whole document was written: clear every flag, stamp the sync time.
    FullDocument { synced_at: NaiveDateTime },
    /// Only one field group was written: clear that flag only.
    DirtyFlag(DirtyFlag),
}

/// Message-count updater selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCountMode {
    /// Users flagged `messages` since their last update, up to a row cap.
    RecentlyUpdated,
    /// Users whose latest message just left the rolling window.
    Outdated,
}

/// Progress signals emitted by the pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SyncProgressEvent {
    Started {
        total_rows: i64,
        total_pages: i64,
    },
    PageCompleted {
        page_index: i64,
        total_pages: i64,
        rows: usize,
    },
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub pages: i64,
    pub indexed: usize,
    pub deleted: usize,
    pub reconcile_failures: usize,
    pub cleanup_scheduled: usize,
    pub duration_ms: i64,
}

/// Result of the rolling counter reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterResetOutcome {
    pub updated: u64,
    pub version_conflicts: u64,
}
