//! Test doubles and fixtures shared by this crate's tests and the API tests.

use aerobook_core::gateway::{
    IssueRequest, IssueResponse, RequoteResponse, ReserveResponse, ValidationFlags,
};
use aerobook_core::passenger::{ContactDetails, Gender, ReservePassenger};
use aerobook_core::search::{CandidateItinerary, SearchCriteria, SearchResult, Segment};
use aerobook_core::{
    FareBreakdown, LegDescriptor, OfferBinding, PassengerRecord, PaxType, UpstreamError,
    UpstreamGateway,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::models::Quote;

/// One call received by [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Requote(OfferBinding),
    Reserve {
        binding: OfferBinding,
        passengers: usize,
    },
    Issue {
        binding: OfferBinding,
        booking_id: String,
        pnr: String,
        is_lcc: bool,
        ancillaries: usize,
    },
    Search(SearchCriteria),
}

impl GatewayCall {
    pub fn is_reserve(&self) -> bool {
        matches!(self, GatewayCall::Reserve { .. })
    }

    pub fn is_issue(&self) -> bool {
        matches!(self, GatewayCall::Issue { .. })
    }
}

/// Gateway that replays queued responses per operation, in call order, and
/// records every call it receives.
#[derive(Default)]
pub struct ScriptedGateway {
    requotes: Mutex<VecDeque<Result<RequoteResponse, UpstreamError>>>,
    reserves: Mutex<VecDeque<Result<ReserveResponse, UpstreamError>>>,
    issues: Mutex<VecDeque<Result<IssueResponse, UpstreamError>>>,
    searches: Mutex<VecDeque<Result<SearchResult, UpstreamError>>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_requote(&self, response: Result<RequoteResponse, UpstreamError>) {
        self.requotes.lock().await.push_back(response);
    }

    pub async fn push_reserve(&self, response: Result<ReserveResponse, UpstreamError>) {
        self.reserves.lock().await.push_back(response);
    }

    pub async fn push_issue(&self, response: Result<IssueResponse, UpstreamError>) {
        self.issues.lock().await.push_back(response);
    }

    pub async fn push_search(&self, response: Result<SearchResult, UpstreamError>) {
        self.searches.lock().await.push_back(response);
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: GatewayCall) {
        self.calls.lock().await.push(call);
    }

    fn unscripted(operation: &str) -> UpstreamError {
        UpstreamError::Business {
            code: 9999,
            message: format!("no scripted {} response", operation),
        }
    }
}

#[async_trait]
impl UpstreamGateway for ScriptedGateway {
    async fn requote(&self, binding: &OfferBinding) -> Result<RequoteResponse, UpstreamError> {
        self.record(GatewayCall::Requote(binding.clone())).await;
        self.requotes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("requote")))
    }

    async fn reserve(
        &self,
        binding: &OfferBinding,
        passengers: &[ReservePassenger],
    ) -> Result<ReserveResponse, UpstreamError> {
        self.record(GatewayCall::Reserve {
            binding: binding.clone(),
            passengers: passengers.len(),
        })
        .await;
        self.reserves
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("reserve")))
    }

    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, UpstreamError> {
        self.record(GatewayCall::Issue {
            binding: request.binding.clone(),
            booking_id: request.booking_id.clone(),
            pnr: request.pnr.clone(),
            is_lcc: request.is_lcc,
            ancillaries: request.passengers.iter().map(|p| p.ancillaries.len()).sum(),
        })
        .await;
        self.issues
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("issue")))
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, UpstreamError> {
        self.record(GatewayCall::Search(criteria.clone())).await;
        self.searches
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("search")))
    }
}

/// 2024-03-`day` at `hour`:`minute`.
pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap_or_default()
}

pub fn fare(published: i64) -> FareBreakdown {
    FareBreakdown {
        currency: "INR".to_string(),
        base_fare: published - 800,
        tax: 800,
        published_fare: published,
        per_pax: vec![],
    }
}

/// Direct AI 865 leg, 130 minutes, bound to `trace-1`/`OB1`.
pub fn descriptor(origin: &str, destination: &str, day: u32, hour: u32, minute: u32) -> LegDescriptor {
    let departure = at(day, hour, minute);
    LegDescriptor {
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::minutes(130),
        carrier_code: "AI".to_string(),
        flight_number: "865".to_string(),
        duration_minutes: 130,
        segment_count: 1,
        fare: fare(5600),
        is_lcc: false,
        binding: OfferBinding::new("trace-1", "OB1"),
    }
}

pub fn segment(
    origin: &str,
    destination: &str,
    carrier: &str,
    flight_number: &str,
    day: u32,
    hour: u32,
    minute: u32,
) -> Segment {
    let departure = at(day, hour, minute);
    Segment {
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::minutes(120),
        carrier_code: carrier.to_string(),
        flight_number: flight_number.to_string(),
    }
}

pub fn candidate(offer_handle: &str, segments: Vec<Segment>) -> CandidateItinerary {
    CandidateItinerary {
        offer_handle: offer_handle.to_string(),
        segments,
        fare: fare(5900),
        is_lcc: false,
    }
}

pub fn search_result(session_token: &str, candidates: Vec<CandidateItinerary>) -> SearchResult {
    SearchResult {
        session_token: session_token.to_string(),
        candidates,
    }
}

pub fn quote(is_lcc: bool, meal_mandatory: bool) -> Quote {
    Quote {
        is_lcc,
        fare: fare(5600),
        flags: ValidationFlags {
            meal_mandatory,
            ..ValidationFlags::default()
        },
    }
}

pub fn requote_ok(session_token: &str, offer_handle: &str, is_lcc: bool) -> RequoteResponse {
    RequoteResponse {
        binding: OfferBinding::new(session_token, offer_handle),
        is_lcc,
        fare: fare(5600),
        flags: ValidationFlags::default(),
    }
}

pub fn reserve_ok(booking_id: &str, pnr: &str) -> ReserveResponse {
    ReserveResponse {
        booking_id: Some(booking_id.to_string()),
        pnr: Some(pnr.to_string()),
        fault: None,
    }
}

pub fn issue_ok(pnr: &str) -> IssueResponse {
    IssueResponse {
        status: Some(1),
        pnr: Some(pnr.to_string()),
        ..IssueResponse::default()
    }
}

pub fn passenger(first_name: &str) -> PassengerRecord {
    PassengerRecord {
        title: "Ms".to_string(),
        first_name: first_name.to_string(),
        last_name: "Iyer".to_string(),
        pax_type: PaxType::Adult,
        gender: Gender::Female,
        date_of_birth: NaiveDate::from_ymd_opt(1992, 6, 1),
        is_lead: true,
        contact: ContactDetails {
            email: "traveler@example.com".to_string(),
            phone: "9800000000".to_string(),
            address_line: "4 Park Street".to_string(),
            city: "Kolkata".to_string(),
            country_code: "IN".to_string(),
        },
        passport: None,
    }
}
