//! Database models for the tables the search sync reads.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use carematch_core::sync::{PreferenceRow, SourceUserRow, WeeklyCodes};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserDB {
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Default,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(user_id))]
#[diesel(table_name = crate::schema::user_availabilities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserAvailabilityDB {
    pub user_id: i64,
    pub monday: Option<String>,
    pub tuesday: Option<String>,
    pub wednesday: Option<String>,
    pub thursday: Option<String>,
    pub friday: Option<String>,
    pub saturday: Option<String>,
    pub sunday: Option<String>,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(user_id))]
#[diesel(table_name = crate::schema::user_preferences)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserPreferenceDB {
    pub user_id: i64,
    pub occasional_care: bool,
    pub regular_care: bool,
    pub max_children: Option<String>,
    pub hourly_rate: Option<f64>,
    pub monday: Option<String>,
    pub tuesday: Option<String>,
    pub wednesday: Option<String>,
    pub thursday: Option<String>,
    pub friday: Option<String>,
    pub saturday: Option<String>,
    pub sunday: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<UserAvailabilityDB> for WeeklyCodes {
    fn from(db: UserAvailabilityDB) -> Self {
        WeeklyCodes([
            db.monday,
            db.tuesday,
            db.wednesday,
            db.thursday,
            db.friday,
            db.saturday,
            db.sunday,
        ])
    }
}

impl From<UserPreferenceDB> for PreferenceRow {
    fn from(db: UserPreferenceDB) -> Self {
        PreferenceRow {
            occasional_care: db.occasional_care,
            regular_care: db.regular_care,
            max_children: db.max_children,
            hourly_rate: db.hourly_rate,
            days: WeeklyCodes([
                db.monday,
                db.tuesday,
                db.wednesday,
                db.thursday,
                db.friday,
                db.saturday,
                db.sunday,
            ]),
            created_at: db.created_at,
        }
    }
}

/// Flattens a user with its optional one-to-one rows.
pub fn into_source_row(
    user: UserDB,
    availability: Option<UserAvailabilityDB>,
    preference: Option<UserPreferenceDB>,
) -> SourceUserRow {
    SourceUserRow {
        id: user.id,
        brand: user.brand,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        role: user.role,
        gender: user.gender,
        birth_date: user.birth_date,
        locale: user.locale,
        city: user.city,
        latitude: user.latitude,
        longitude: user.longitude,
        active: user.active,
        disabled: user.disabled,
        deleted: user.deleted,
        completed: user.completed,
        inappropriate: user.inappropriate,
        invisible: user.invisible,
        last_active_at: user.last_active_at,
        last_synced_at: user.last_synced_at,
        updated_at: user.updated_at,
        availability: availability.map(WeeklyCodes::from),
        preference: preference.map(PreferenceRow::from),
    }
}

#[derive(QueryableByName, Debug)]
pub struct UserIdRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub user_id: i64,
}

#[derive(QueryableByName, Debug)]
pub struct InviteCountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub user_id: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub invite_count: i64,
    #[diesel(sql_type = diesel::sql_types::Timestamp)]
    pub latest_at: NaiveDateTime,
}
