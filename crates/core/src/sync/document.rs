//! Shape of a user document in the search index.

use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::sync_model::WEEKDAYS;

/// Index field holding the recent message volume.
pub const MESSAGES_RECEIVED_FIELD: &str = "messages_received";

/// Index field holding today's invite count. Only the invite updater and
/// the daily reset write it; full documents never carry it.
pub const INVITES_TODAY_FIELD: &str = "invites_today";

/// Index field holding the geo-point.
pub const LOCATION_FIELD: &str = "location";

/// Elasticsearch `geo_point` in object form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// A geo-point needs both coordinates; a partial pair yields nothing.
    pub fn from_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Self { lat, lon }),
            _ => None,
        }
    }
}

/// One day of availability: the normalized code and its readable tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub code: String,
    pub slots: String,
}

/// Seven [`DayAvailability`] entries, serialized as a map keyed by weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyAvailability(pub [DayAvailability; 7]);

impl WeeklyAvailability {
    pub fn day(&self, weekday: &str) -> Option<&DayAvailability> {
        WEEKDAYS
            .iter()
            .position(|day| *day == weekday)
            .map(|idx| &self.0[idx])
    }
}

impl Serialize for WeeklyAvailability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(WEEKDAYS.len()))?;
        for (day, availability) in WEEKDAYS.iter().zip(self.0.iter()) {
            map.serialize_entry(day, availability)?;
        }
        map.end()
    }
}

/// Denormalized user document.
///
/// `deleted` and the raw coordinates never reach the index: the translator
/// turns the first into a delete action and the second into [`GeoPoint`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedDocument {
    pub id: i64,
    pub brand: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub locale: Option<String>,
    pub city: Option<String>,

    pub active: bool,
    pub disabled: bool,
    pub completed: bool,
    pub inappropriate: bool,
    pub invisible: bool,
    #[serde(skip)]
    pub deleted: bool,

    pub occasional_care: bool,
    pub regular_care: bool,
    pub max_children: Option<i64>,
    pub hourly_rate: Option<f64>,
    pub offered_availability: WeeklyAvailability,
    pub preferred_availability: WeeklyAvailability,

    #[serde(skip)]
    pub latitude: Option<f64>,
    #[serde(skip)]
    pub longitude: Option<f64>,

    pub children_count: i64,
    pub recommendation_count: i64,
    pub messages_received: i64,
    pub has_avatar: bool,
    pub has_avatar_warning: bool,
    pub premium_eligible: bool,

    pub last_active_at: Option<NaiveDateTime>,
    /// Freshness of the source data this document was built from.
    pub updated_at: NaiveDateTime,
}

impl ProjectedDocument {
    pub fn document_id(&self) -> String {
        self.id.to_string()
    }

    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_coordinates(self.latitude, self.longitude)
    }
}
