use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::itinerary::{FareBreakdown, LegDescriptor};
use crate::passenger::{PassengerRecord, PaxType};

/// One-way search used to re-establish a session for a single leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate, // Just date, time is matched later by the rematcher
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
}

impl SearchCriteria {
    /// Criteria for re-searching `leg`, always one-way regardless of the trip shape.
    pub fn for_leg(leg: &LegDescriptor, passengers: &[PassengerRecord]) -> Self {
        let count = |t: PaxType| passengers.iter().filter(|p| p.pax_type == t).count() as u32;
        Self {
            origin: leg.origin.clone(),
            destination: leg.destination.clone(),
            date: leg.departure_date(),
            adults: count(PaxType::Adult).max(1),
            children: count(PaxType::Child),
            infants: count(PaxType::Infant),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub origin: String,
    pub destination: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
    pub carrier_code: String,
    pub flight_number: String,
}

/// One priced itinerary from a fresh search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItinerary {
    pub offer_handle: String,
    pub segments: Vec<Segment>,
    pub fare: FareBreakdown,
    pub is_lcc: bool,
}

impl CandidateItinerary {
    pub fn first_segment(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn origin(&self) -> Option<&str> {
        self.segments.first().map(|s| s.origin.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.segments.last().map(|s| s.destination.as_str())
    }

    pub fn departure_time(&self) -> Option<NaiveDateTime> {
        self.segments.first().map(|s| s.departure_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub session_token: String,
    pub candidates: Vec<CandidateItinerary>,
}
