use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sql_types::{Date, Text, Timestamp};
use diesel::sqlite::{Sqlite, SqliteConnection};
use log::debug;

use carematch_core::sync::{
    AuxiliaryLookups, DirtyFlag, InviteCount, Reconciliation, SearchSourceRepositoryTrait,
    SelectionFilter, SourceUserRow,
};
use carematch_core::Result;

use super::model::{
    into_source_row, InviteCountRow, UserAvailabilityDB, UserDB, UserIdRow, UserPreferenceDB,
};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{
    avatar_warnings, avatars, children, messages, orders, recommendations, user_availabilities,
    user_dirty_flags, user_preferences, users,
};

/// Order status that makes a user eligible for premium placement.
pub const PAID_ORDER_STATUS: &str = "paid";

const MESSAGE_BOUNDARY_SQL: &str = "\
    SELECT m.receiver_id AS user_id \
    FROM messages m \
    INNER JOIN users u ON u.id = m.receiver_id \
    WHERE u.brand = ? AND u.deleted = 0 \
    GROUP BY m.receiver_id \
    HAVING date(MAX(m.created_at)) = ? \
    ORDER BY m.receiver_id";

const INVITE_COUNTS_SQL: &str = "\
    SELECT i.receiver_id AS user_id, COUNT(*) AS invite_count, MAX(i.created_at) AS latest_at \
    FROM invites i \
    INNER JOIN users u ON u.id = i.receiver_id \
    WHERE u.brand = ? AND u.deleted = 0 AND i.created_at >= ? AND i.created_at < ? \
    GROUP BY i.receiver_id \
    HAVING MAX(i.created_at) >= ? \
    ORDER BY i.receiver_id";

fn selected_users<'a>(brand: &'a str, filter: &SelectionFilter) -> users::BoxedQuery<'a, Sqlite> {
    let query = users::table.filter(users::brand.eq(brand)).into_boxed();
    match filter {
        SelectionFilter::All => query,
        SelectionFilter::Enabled => query
            .filter(users::active.eq(true))
            .filter(users::disabled.eq(false)),
        SelectionFilter::SyncedBefore(cutoff) => query.filter(
            users::last_synced_at
                .is_null()
                .or(users::last_synced_at.lt(*cutoff)),
        ),
        SelectionFilter::ActiveSince(cutoff) => query
            .filter(users::last_active_at.ge(*cutoff))
            .filter(users::disabled.eq(false)),
        SelectionFilter::Ids(ids) => {
            query.filter(users::id.eq_any(ids.iter().copied().collect::<Vec<_>>()))
        }
    }
}

fn counts_by_user(rows: Vec<(i64, i64)>) -> HashMap<i64, i64> {
    rows.into_iter().collect()
}

pub struct SearchSourceRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SearchSourceRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        SearchSourceRepository { pool, writer }
    }

    fn load_users_impl(
        &self,
        brand: &str,
        filter: &SelectionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SourceUserRow>> {
        let mut conn = get_connection(&self.pool)?;
        let users_db = selected_users(brand, filter)
            .order(users::id.asc())
            .offset(offset)
            .limit(limit)
            .select(UserDB::as_select())
            .load::<UserDB>(&mut conn)
            .map_err(StorageError::from)?;
        if users_db.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = users_db.iter().map(|user| user.id).collect();
        let mut availabilities: HashMap<i64, UserAvailabilityDB> = user_availabilities::table
            .filter(user_availabilities::user_id.eq_any(ids.clone()))
            .select(UserAvailabilityDB::as_select())
            .load::<UserAvailabilityDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(|row| (row.user_id, row))
            .collect();
        let mut preferences: HashMap<i64, UserPreferenceDB> = user_preferences::table
            .filter(user_preferences::user_id.eq_any(ids))
            .select(UserPreferenceDB::as_select())
            .load::<UserPreferenceDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(|row| (row.user_id, row))
            .collect();

        Ok(users_db
            .into_iter()
            .map(|user| {
                let availability = availabilities.remove(&user.id);
                let preference = preferences.remove(&user.id);
                into_source_row(user, availability, preference)
            })
            .collect())
    }

    fn load_auxiliary_lookups_impl(
        &self,
        user_ids: &[i64],
        messages_since: NaiveDateTime,
    ) -> Result<HashMap<i64, AuxiliaryLookups>> {
        let mut conn = get_connection(&self.pool)?;

        let children_counts = counts_by_user(
            children::table
                .filter(children::user_id.eq_any(user_ids.to_vec()))
                .group_by(children::user_id)
                .select((children::user_id, count_star()))
                .load::<(i64, i64)>(&mut conn)
                .map_err(StorageError::from)?,
        );
        let recommendation_counts = counts_by_user(
            recommendations::table
                .filter(recommendations::user_id.eq_any(user_ids.to_vec()))
                .group_by(recommendations::user_id)
                .select((recommendations::user_id, count_star()))
                .load::<(i64, i64)>(&mut conn)
                .map_err(StorageError::from)?,
        );
        let message_counts = counts_by_user(
            messages::table
                .filter(messages::receiver_id.eq_any(user_ids.to_vec()))
                .filter(messages::created_at.ge(messages_since))
                .group_by(messages::receiver_id)
                .select((messages::receiver_id, count_star()))
                .load::<(i64, i64)>(&mut conn)
                .map_err(StorageError::from)?,
        );
        let with_avatar: HashSet<i64> = avatars::table
            .filter(avatars::user_id.eq_any(user_ids.to_vec()))
            .select(avatars::user_id)
            .distinct()
            .load::<i64>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .collect();
        let with_warning: HashSet<i64> = avatar_warnings::table
            .filter(avatar_warnings::user_id.eq_any(user_ids.to_vec()))
            .filter(avatar_warnings::resolved.eq(false))
            .select(avatar_warnings::user_id)
            .distinct()
            .load::<i64>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .collect();
        let with_paid_order: HashSet<i64> = orders::table
            .filter(orders::user_id.eq_any(user_ids.to_vec()))
            .filter(orders::status.eq(PAID_ORDER_STATUS))
            .select(orders::user_id)
            .distinct()
            .load::<i64>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .collect();

        Ok(user_ids
            .iter()
            .map(|id| {
                let lookups = AuxiliaryLookups {
                    children_count: children_counts.get(id).copied().unwrap_or(0),
                    recommendation_count: recommendation_counts.get(id).copied().unwrap_or(0),
                    messages_received: message_counts.get(id).copied().unwrap_or(0),
                    has_avatar: with_avatar.contains(id),
                    has_avatar_warning: with_warning.contains(id),
                    premium_eligible: with_paid_order.contains(id),
                };
                (*id, lookups)
            })
            .collect())
    }
}

#[async_trait]
impl SearchSourceRepositoryTrait for SearchSourceRepository {
    async fn count_users(&self, brand: &str, filter: &SelectionFilter) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let total = selected_users(brand, filter)
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(total)
    }

    async fn load_users(
        &self,
        brand: &str,
        filter: &SelectionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SourceUserRow>> {
        self.load_users_impl(brand, filter, offset, limit)
    }

    async fn load_auxiliary_lookups(
        &self,
        user_ids: &[i64],
        messages_since: NaiveDateTime,
    ) -> Result<HashMap<i64, AuxiliaryLookups>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.load_auxiliary_lookups_impl(user_ids, messages_since)
    }

    async fn mark_synced(&self, user_ids: &[i64], reconciliation: Reconciliation) -> Result<usize> {
        let ids = user_ids.to_vec();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                match reconciliation {
                    Reconciliation::FullDocument { synced_at } => {
                        let updated = diesel::update(users::table.filter(users::id.eq_any(ids.clone())))
                            .set(users::last_synced_at.eq(Some(synced_at)))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        let cleared = diesel::delete(
                            user_dirty_flags::table.filter(user_dirty_flags::user_id.eq_any(ids)),
                        )
                        .execute(conn)
                        .map_err(StorageError::from)?;
                        debug!(
                            "[SearchSync] Stamped {} user(s), cleared {} flag(s)",
                            updated, cleared
                        );
                        Ok(updated)
                    }
                    Reconciliation::DirtyFlag(flag) => {
                        let cleared = diesel::delete(
                            user_dirty_flags::table
                                .filter(user_dirty_flags::user_id.eq_any(ids))
                                .filter(user_dirty_flags::flag.eq(flag.as_str())),
                        )
                        .execute(conn)
                        .map_err(StorageError::from)?;
                        Ok(cleared)
                    }
                }
            })
            .await
    }

    async fn load_flagged_user_ids(
        &self,
        brand: &str,
        flag: DirtyFlag,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let mut conn = get_connection(&self.pool)?;
        let ids = user_dirty_flags::table
            .inner_join(users::table)
            .filter(user_dirty_flags::flag.eq(flag.as_str()))
            .filter(users::brand.eq(brand))
            .filter(users::deleted.eq(false))
            .select(user_dirty_flags::user_id)
            .order(user_dirty_flags::user_id.asc())
            .limit(limit)
            .load::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(ids)
    }

    async fn load_message_boundary_user_ids(
        &self,
        brand: &str,
        boundary: NaiveDate,
    ) -> Result<Vec<i64>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = diesel::sql_query(MESSAGE_BOUNDARY_SQL)
            .bind::<Text, _>(brand.to_string())
            .bind::<Date, _>(boundary)
            .load::<UserIdRow>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|row| row.user_id).collect())
    }

    async fn count_messages_received(
        &self,
        user_ids: &[i64],
        since: NaiveDateTime,
    ) -> Result<HashMap<i64, i64>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = get_connection(&self.pool)?;
        let rows = messages::table
            .filter(messages::receiver_id.eq_any(user_ids.to_vec()))
            .filter(messages::created_at.ge(since))
            .group_by(messages::receiver_id)
            .select((messages::receiver_id, count_star()))
            .load::<(i64, i64)>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(counts_by_user(rows))
    }

    async fn load_invite_counts(
        &self,
        brand: &str,
        day_start: NaiveDateTime,
        bucket_start: NaiveDateTime,
        bucket_end: NaiveDateTime,
    ) -> Result<Vec<InviteCount>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = diesel::sql_query(INVITE_COUNTS_SQL)
            .bind::<Text, _>(brand.to_string())
            .bind::<Timestamp, _>(day_start)
            .bind::<Timestamp, _>(bucket_end)
            .bind::<Timestamp, _>(bucket_start)
            .load::<InviteCountRow>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| InviteCount {
                user_id: row.user_id,
                count: row.invite_count,
                latest_at: row.latest_at,
            })
            .collect())
    }
}
