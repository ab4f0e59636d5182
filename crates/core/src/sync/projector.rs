//! Row projection: one flattened source row plus its lookups becomes one
//! index document. Pure, no I/O.

use chrono::{NaiveDate, NaiveDateTime};

use super::document::{DayAvailability, ProjectedDocument, WeeklyAvailability};
use super::sync_model::{AuxiliaryLookups, PreferenceRow, SourceUserRow, WeeklyCodes};

/// Time slots in code order: `'1'`, `'2'`, `'3'`.
const SLOTS: [(char, &str); 3] = [('1', "morning"), ('2', "afternoon"), ('3', "evening")];

/// Code covering every slot of a day.
pub const FULL_DAY_CODE: &str = "123";

/// Sentinel used by the source for "four or more children".
pub const MAX_CHILDREN_OPEN_SENTINEL: &str = "4+";

/// Numeric value stored for [`MAX_CHILDREN_OPEN_SENTINEL`]. Range filters like
/// `max_children >= 5` must still match an open-ended answer.
pub const MAX_CHILDREN_CEILING: i64 = 10;

/// Preferences created before this instant did not record per-day
/// availability for occasional-only care. Must never move: doing so changes
/// which historical users show up in day-filtered searches.
pub fn availability_backfill_cutover() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 11, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Normalize a raw code: keep known slot characters once, in slot order.
pub fn normalize_code(raw: &str) -> String {
    SLOTS
        .iter()
        .filter(|(code, _)| raw.contains(*code))
        .map(|(code, _)| *code)
        .collect()
}

/// `"13"` becomes `"morning evening"`. Unknown characters are ignored.
pub fn slot_tokens(raw: &str) -> String {
    SLOTS
        .iter()
        .filter(|(code, _)| raw.contains(*code))
        .map(|(_, token)| *token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn day_availability(raw: Option<&str>) -> DayAvailability {
    let raw = raw.unwrap_or_default();
    DayAvailability {
        code: normalize_code(raw),
        slots: slot_tokens(raw),
    }
}

pub fn encode_week(codes: &WeeklyCodes) -> WeeklyAvailability {
    WeeklyAvailability(codes.0.each_ref().map(|code| day_availability(code.as_deref())))
}

fn full_week() -> WeeklyAvailability {
    WeeklyAvailability(std::array::from_fn(|_| day_availability(Some(FULL_DAY_CODE))))
}

/// Whether the preference predates day-level availability for its cohort.
pub fn needs_availability_backfill(preference: &PreferenceRow) -> bool {
    preference.created_at < availability_backfill_cutover()
        && preference.occasional_care
        && !preference.regular_care
}

/// Preferred availability, with the historical backfill applied.
pub fn preferred_week(preference: Option<&PreferenceRow>) -> WeeklyAvailability {
    match preference {
        Some(pref) if needs_availability_backfill(pref) => full_week(),
        Some(pref) => encode_week(&pref.days),
        None => WeeklyAvailability::default(),
    }
}

/// Map the "max children" enum onto a number usable in range filters.
pub fn max_children_value(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    if raw == MAX_CHILDREN_OPEN_SENTINEL {
        return Some(MAX_CHILDREN_CEILING);
    }
    raw.parse::<i64>().ok().filter(|n| *n >= 0)
}

/// Build the index document for one row.
pub fn project(row: &SourceUserRow, lookups: &AuxiliaryLookups) -> ProjectedDocument {
    let preference = row.preference.as_ref();

    ProjectedDocument {
        id: row.id,
        brand: row.brand.clone(),
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        role: row.role.clone(),
        gender: row.gender.clone(),
        birth_date: row.birth_date,
        locale: row.locale.clone(),
        city: row.city.clone(),
        active: row.active,
        disabled: row.disabled,
        completed: row.completed,
        inappropriate: row.inappropriate,
        invisible: row.invisible,
        deleted: row.deleted,
        occasional_care: preference.map(|p| p.occasional_care).unwrap_or(false),
        regular_care: preference.map(|p| p.regular_care).unwrap_or(false),
        max_children: max_children_value(preference.and_then(|p| p.max_children.as_deref())),
        hourly_rate: preference.and_then(|p| p.hourly_rate),
        offered_availability: row
            .availability
            .as_ref()
            .map(encode_week)
            .unwrap_or_default(),
        preferred_availability: preferred_week(preference),
        latitude: row.latitude,
        longitude: row.longitude,
        children_count: lookups.children_count,
        recommendation_count: lookups.recommendation_count,
        messages_received: lookups.messages_received,
        has_avatar: lookups.has_avatar,
        has_avatar_warning: lookups.has_avatar_warning,
        premium_eligible: lookups.premium_eligible,
        last_active_at: row.last_active_at,
        updated_at: row.updated_at,
    }
}
