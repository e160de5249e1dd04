//! HTTP client for the flight-distribution API.
//!
//! The API speaks PascalCase JSON and reports business failures inside
//! HTTP 200 bodies as `Error { ErrorCode, ErrorMessage }`. This module maps
//! those shapes onto the gateway contract and nothing else: no retries, no
//! classification beyond transport vs business.

use aerobook_core::gateway::{
    IssueRequest, IssueResponse, RequoteResponse, ReserveResponse, UpstreamFault,
    ValidationFlags,
};
use aerobook_core::itinerary::PaxTypeFare;
use aerobook_core::passenger::{Gender, PassengerFare, PassengerRecord};
use aerobook_core::search::{CandidateItinerary, SearchCriteria, SearchResult, Segment};
use aerobook_core::{
    AncillaryKind, AncillarySelection, FareBreakdown, OfferBinding, PaxType, UpstreamError,
    UpstreamGateway,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::app_config::UpstreamConfig;

const SEARCH_PATH: &str = "/Search";
const FARE_QUOTE_PATH: &str = "/FareQuote";
const BOOK_PATH: &str = "/Book";
const TICKET_PATH: &str = "/Ticket";

/// One-way journey type code.
const JOURNEY_ONE_WAY: i32 = 1;

pub struct HttpGateway {
    client: Client,
    base_url: String,
    client_id: String,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let timeout = config.call_timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            timeout,
        })
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, UpstreamError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Transport {
                status: Some(status.as_u16()),
                message: format!("{} returned {}: {}", path, status, text),
            });
        }

        response.json::<Resp>().await.map_err(|e| UpstreamError::Transport {
            status: None,
            message: format!("invalid {} response: {}", path, e),
        })
    }

    fn transport(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl UpstreamGateway for HttpGateway {
    async fn requote(&self, binding: &OfferBinding) -> Result<RequoteResponse, UpstreamError> {
        let request = OfferRequest {
            client_id: &self.client_id,
            trace_id: &binding.session_token,
            result_index: &binding.offer_handle,
        };
        let response: FareQuoteResponse = self.post(FARE_QUOTE_PATH, &request).await?;
        response.into_requote(binding)
    }

    async fn reserve(
        &self,
        binding: &OfferBinding,
        passengers: &[aerobook_core::passenger::ReservePassenger],
    ) -> Result<ReserveResponse, UpstreamError> {
        let request = BookRequest {
            client_id: &self.client_id,
            trace_id: &binding.session_token,
            result_index: &binding.offer_handle,
            passengers: passengers
                .iter()
                .map(|p| PassengerDto::new(&p.identity, &p.fare, &[]))
                .collect(),
        };
        let response: BookResponse = self.post(BOOK_PATH, &request).await?;
        info!("Book responded with status {:?}", response.response_status);
        Ok(response.into())
    }

    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, UpstreamError> {
        let body = TicketRequest {
            client_id: &self.client_id,
            trace_id: &request.binding.session_token,
            result_index: request.is_lcc.then_some(request.binding.offer_handle.as_str()),
            booking_id: request.booking_id.parse().ok(),
            pnr: (!request.pnr.is_empty()).then_some(request.pnr.as_str()),
            is_lcc: request.is_lcc,
            passengers: request
                .passengers
                .iter()
                .map(|p| PassengerDto::new(&p.identity, &p.fare, &p.ancillaries))
                .collect(),
        };
        let response: TicketResponse = self.post(TICKET_PATH, &body).await?;
        info!("Ticket responded with status {:?}", response.response_status);
        Ok(response.into())
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, UpstreamError> {
        let request = SearchRequest::from(criteria);
        let response: SearchResponse = self.post(SEARCH_PATH, &request).await?;
        response.into_result()
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDto {
    #[serde(default)]
    error_code: i32,
    #[serde(default)]
    error_message: String,
}

fn business(error: &Option<ErrorDto>) -> Option<UpstreamError> {
    error
        .as_ref()
        .filter(|e| e.error_code != 0)
        .map(|e| UpstreamError::Business {
            code: e.error_code,
            message: e.error_message.clone(),
        })
}

fn fault(error: Option<ErrorDto>) -> Option<UpstreamFault> {
    error.map(|e| UpstreamFault {
        code: e.error_code,
        message: e.error_message,
    })
}

/// Major currency units on the wire, minor units inside.
fn minor(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn major(amount: i64) -> f64 {
    amount as f64 / 100.0
}

fn pax_code(pax_type: PaxType) -> i32 {
    match pax_type {
        PaxType::Adult => 1,
        PaxType::Child => 2,
        PaxType::Infant => 3,
    }
}

fn pax_from_code(code: i32) -> Option<PaxType> {
    match code {
        1 => Some(PaxType::Adult),
        2 => Some(PaxType::Child),
        3 => Some(PaxType::Infant),
        _ => None,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OfferRequest<'a> {
    client_id: &'a str,
    trace_id: &'a str,
    result_index: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FareDto {
    currency: String,
    base_fare: f64,
    tax: f64,
    published_fare: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PaxFareDto {
    passenger_type: i32,
    passenger_count: u32,
    base_fare: f64,
    tax: f64,
}

fn breakdown(fare: FareDto, per_pax: Vec<PaxFareDto>) -> FareBreakdown {
    FareBreakdown {
        base_fare: minor(fare.base_fare),
        tax: minor(fare.tax),
        published_fare: minor(fare.published_fare),
        per_pax: per_pax
            .into_iter()
            .filter_map(|p| {
                pax_from_code(p.passenger_type).map(|pax_type| PaxTypeFare {
                    pax_type,
                    pax_count: p.passenger_count,
                    base_fare: minor(p.base_fare),
                    tax: minor(p.tax),
                })
            })
            .collect(),
        currency: fare.currency,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FareQuoteResult {
    result_index: String,
    #[serde(rename = "IsLCC")]
    is_lcc: bool,
    fare: FareDto,
    #[serde(default)]
    fare_breakdown: Vec<PaxFareDto>,
    #[serde(default)]
    is_meal_mandatory: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FareQuoteResponse {
    error: Option<ErrorDto>,
    trace_id: Option<String>,
    #[serde(default)]
    is_price_changed: bool,
    #[serde(default)]
    is_time_changed: bool,
    results: Option<FareQuoteResult>,
}

impl FareQuoteResponse {
    fn into_requote(self, sent: &OfferBinding) -> Result<RequoteResponse, UpstreamError> {
        if let Some(err) = business(&self.error) {
            return Err(err);
        }
        let result = self.results.ok_or_else(|| UpstreamError::Business {
            code: 0,
            message: "fare quote returned no result".to_string(),
        })?;

        // The token/handle pair is replaced together or not at all.
        let binding = match self.trace_id.filter(|t| !t.is_empty()) {
            Some(token) if !result.result_index.is_empty() => {
                OfferBinding::new(token, result.result_index)
            }
            _ => sent.clone(),
        };

        Ok(RequoteResponse {
            binding,
            is_lcc: result.is_lcc,
            fare: breakdown(result.fare, result.fare_breakdown),
            flags: ValidationFlags {
                price_changed: self.is_price_changed,
                schedule_changed: self.is_time_changed,
                meal_mandatory: result.is_meal_mandatory,
            },
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FareDtoOut<'a> {
    currency: &'a str,
    base_fare: f64,
    tax: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SsrDto<'a> {
    code: &'a str,
    description: Option<&'a str>,
    price: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PassengerDto<'a> {
    title: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    pax_type: i32,
    gender: i32,
    date_of_birth: Option<String>,
    is_lead_pax: bool,
    email: &'a str,
    contact_no: &'a str,
    address_line1: &'a str,
    city: &'a str,
    country_code: &'a str,
    passport_no: Option<&'a str>,
    passport_expiry: Option<String>,
    nationality: Option<&'a str>,
    fare: FareDtoOut<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meal_dynamic: Vec<SsrDto<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    baggage: Vec<SsrDto<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    seat_dynamic: Vec<SsrDto<'a>>,
}

impl<'a> PassengerDto<'a> {
    fn new(
        p: &'a PassengerRecord,
        fare: &'a PassengerFare,
        ancillaries: &'a [AncillarySelection],
    ) -> Self {
        let ssr = move |kind: AncillaryKind| -> Vec<SsrDto<'a>> {
            ancillaries
                .iter()
                .filter(|a| a.kind == kind)
                .map(|a| SsrDto {
                    code: &a.code,
                    description: a.description.as_deref(),
                    price: major(a.price),
                })
                .collect()
        };

        Self {
            title: &p.title,
            first_name: &p.first_name,
            last_name: &p.last_name,
            pax_type: pax_code(p.pax_type),
            gender: match p.gender {
                Gender::Male => 1,
                Gender::Female => 2,
            },
            date_of_birth: p.date_of_birth.map(|d| format!("{}T00:00:00", d)),
            is_lead_pax: p.is_lead,
            email: &p.contact.email,
            contact_no: &p.contact.phone,
            address_line1: &p.contact.address_line,
            city: &p.contact.city,
            country_code: &p.contact.country_code,
            passport_no: p.passport.as_ref().map(|pp| pp.number.expose().as_str()),
            passport_expiry: p.passport.as_ref().map(|pp| format!("{}T00:00:00", pp.expiry)),
            nationality: p.passport.as_ref().map(|pp| pp.nationality.as_str()),
            fare: FareDtoOut {
                currency: &fare.currency,
                base_fare: major(fare.base_fare),
                tax: major(fare.tax),
            },
            meal_dynamic: ssr(AncillaryKind::Meal),
            baggage: ssr(AncillaryKind::Baggage),
            seat_dynamic: ssr(AncillaryKind::Seat),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BookRequest<'a> {
    client_id: &'a str,
    trace_id: &'a str,
    result_index: &'a str,
    passengers: Vec<PassengerDto<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BookResponse {
    error: Option<ErrorDto>,
    response_status: Option<i32>,
    booking_id: Option<u64>,
    #[serde(rename = "PNR")]
    pnr: Option<String>,
}

impl From<BookResponse> for ReserveResponse {
    fn from(r: BookResponse) -> Self {
        ReserveResponse {
            booking_id: r.booking_id.filter(|id| *id != 0).map(|id| id.to_string()),
            pnr: r.pnr,
            fault: fault(r.error),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TicketRequest<'a> {
    client_id: &'a str,
    trace_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_index: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    booking_id: Option<u64>,
    #[serde(rename = "PNR", skip_serializing_if = "Option::is_none")]
    pnr: Option<&'a str>,
    #[serde(rename = "IsLCC")]
    is_lcc: bool,
    passengers: Vec<PassengerDto<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TicketResponse {
    error: Option<ErrorDto>,
    response_status: Option<i32>,
    booking_id: Option<u64>,
    #[serde(rename = "PNR")]
    pnr: Option<String>,
    #[serde(default)]
    flight_itinerary: serde_json::Value,
}

impl From<TicketResponse> for IssueResponse {
    fn from(r: TicketResponse) -> Self {
        IssueResponse {
            status: r.response_status,
            fault: fault(r.error),
            pnr: r.pnr,
            booking_id: r.booking_id.filter(|id| *id != 0).map(|id| id.to_string()),
            itinerary: r.flight_itinerary,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchSegmentDto {
    origin: String,
    destination: String,
    preferred_departure_time: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchRequest {
    adult_count: u32,
    child_count: u32,
    infant_count: u32,
    journey_type: i32,
    segments: Vec<SearchSegmentDto>,
}

impl From<&SearchCriteria> for SearchRequest {
    fn from(c: &SearchCriteria) -> Self {
        Self {
            adult_count: c.adults,
            child_count: c.children,
            infant_count: c.infants,
            journey_type: JOURNEY_ONE_WAY,
            segments: vec![SearchSegmentDto {
                origin: c.origin.clone(),
                destination: c.destination.clone(),
                preferred_departure_time: format!("{}T00:00:00", c.date),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SegmentDto {
    origin: String,
    destination: String,
    dep_time: NaiveDateTime,
    arr_time: NaiveDateTime,
    airline_code: String,
    flight_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchItemDto {
    result_index: String,
    #[serde(rename = "IsLCC")]
    is_lcc: bool,
    fare: FareDto,
    /// Segment groups per journey; one-way searches carry a single group.
    segments: Vec<Vec<SegmentDto>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    error: Option<ErrorDto>,
    trace_id: Option<String>,
    #[serde(default)]
    results: Vec<Vec<SearchItemDto>>,
}

impl SearchResponse {
    fn into_result(self) -> Result<SearchResult, UpstreamError> {
        if let Some(err) = business(&self.error) {
            return Err(err);
        }
        let session_token = self.trace_id.filter(|t| !t.is_empty()).ok_or_else(|| {
            UpstreamError::Business {
                code: 0,
                message: "search returned no trace id".to_string(),
            }
        })?;

        let candidates = self
            .results
            .into_iter()
            .flatten()
            .map(|item| CandidateItinerary {
                offer_handle: item.result_index,
                segments: item
                    .segments
                    .into_iter()
                    .next()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|s| Segment {
                        origin: s.origin,
                        destination: s.destination,
                        departure_time: s.dep_time,
                        arrival_time: s.arr_time,
                        carrier_code: s.airline_code,
                        flight_number: s.flight_number,
                    })
                    .collect(),
                fare: breakdown(item.fare, Vec::new()),
                is_lcc: item.is_lcc,
            })
            .collect();

        Ok(SearchResult {
            session_token,
            candidates,
        })
    }
}
