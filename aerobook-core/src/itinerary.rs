use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session token plus the offer handle it produced.
///
/// A handle is meaningless outside the token that issued it, so the two only
/// ever travel together and are replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferBinding {
    pub session_token: String,
    pub offer_handle: String,
}

impl OfferBinding {
    pub fn new(session_token: impl Into<String>, offer_handle: impl Into<String>) -> Self {
        Self {
            session_token: session_token.into(),
            offer_handle: offer_handle.into(),
        }
    }
}

/// Per passenger-type slice of a fare, as returned by the distribution API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaxTypeFare {
    pub pax_type: crate::passenger::PaxType,
    pub pax_count: u32,
    /// Base fare for all passengers of this type combined.
    pub base_fare: i64,
    pub tax: i64,
}

/// Money fields for one leg, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub currency: String,
    pub base_fare: i64,
    pub tax: i64,
    pub published_fare: i64,
    #[serde(default)]
    pub per_pax: Vec<PaxTypeFare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripShape {
    OneWay,
    RoundTrip,
    MultiCity,
}

impl TripShape {
    pub const MAX_CITY_LEGS: usize = 6;

    /// Checks a leg count against the shape.
    pub fn accepts(&self, leg_count: usize) -> bool {
        match self {
            TripShape::OneWay => leg_count == 1,
            TripShape::RoundTrip => leg_count == 2,
            TripShape::MultiCity => (2..=Self::MAX_CITY_LEGS).contains(&leg_count),
        }
    }

    /// Key under which ancillaries for the leg at `index` are filed.
    pub fn leg_key(&self, index: usize) -> LegKey {
        match (self, index) {
            (TripShape::OneWay, _) => LegKey::OneWay,
            (TripShape::RoundTrip, 0) => LegKey::Outbound,
            (TripShape::RoundTrip, _) => LegKey::Return,
            (TripShape::MultiCity, i) => LegKey::City(i),
        }
    }
}

impl fmt::Display for TripShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TripShape::OneWay => "ONE_WAY",
            TripShape::RoundTrip => "ROUND_TRIP",
            TripShape::MultiCity => "MULTI_CITY",
        };
        f.write_str(name)
    }
}

/// Identifies a leg for ancillary tagging: a fixed tag for one-way and
/// round-trip, a positional index for multi-city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "tag", content = "index", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegKey {
    OneWay,
    Outbound,
    Return,
    City(usize),
}

/// Snapshot of one directional leg as the user committed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegDescriptor {
    pub origin: String,
    pub destination: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
    /// Marketing carrier of the first segment.
    pub carrier_code: String,
    pub flight_number: String,
    pub duration_minutes: u32,
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,
    pub fare: FareBreakdown,
    pub is_lcc: bool,
    pub binding: OfferBinding,
}

fn default_segment_count() -> usize {
    1
}

impl LegDescriptor {
    /// Returns a copy bound to a new token/handle pair; identifying fields are kept.
    pub fn rebind(&self, binding: OfferBinding) -> Self {
        Self {
            binding,
            ..self.clone()
        }
    }

    pub fn departure_date(&self) -> chrono::NaiveDate {
        self.departure_time.date()
    }

    pub fn route(&self) -> String {
        format!("{}-{}", self.origin, self.destination)
    }
}
