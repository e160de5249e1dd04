use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::itinerary::{FareBreakdown, OfferBinding};
use crate::passenger::{IssuePassenger, ReservePassenger};
use crate::search::{SearchCriteria, SearchResult};

/// Status value the distribution API uses for an explicitly successful ticket.
pub const ISSUE_SUCCESS_STATUS: i32 = 1;
/// Default rejection sentinel for Issue responses.
pub const ISSUE_REJECTED_STATUS: i32 = 2;

/// Checks the distribution API raises during Requote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFlags {
    pub price_changed: bool,
    pub schedule_changed: bool,
    pub meal_mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequoteResponse {
    pub binding: OfferBinding,
    pub is_lcc: bool,
    pub fare: FareBreakdown,
    pub flags: ValidationFlags,
}

/// Business error embedded in a transport-level success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamFault {
    pub code: i32,
    pub message: String,
}

impl UpstreamFault {
    pub fn is_error(&self) -> bool {
        self.code != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub booking_id: Option<String>,
    pub pnr: Option<String>,
    pub fault: Option<UpstreamFault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Empty for low-cost-carrier legs, which ticket straight from the requote handle.
    pub booking_id: String,
    pub pnr: String,
    pub binding: OfferBinding,
    pub is_lcc: bool,
    pub passengers: Vec<IssuePassenger>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueResponse {
    /// Some response shapes carry an explicit status, others omit it.
    pub status: Option<i32>,
    pub fault: Option<UpstreamFault>,
    pub pnr: Option<String>,
    pub booking_id: Option<String>,
    #[serde(default)]
    pub itinerary: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueVerdict {
    Ticketed,
    Faulted(UpstreamFault),
    Rejected(i32),
    /// A status value that is neither the success value nor the sentinel.
    Unrecognized(i32),
}

impl IssueResponse {
    /// Success is an explicit success status, or an absent status without a fault.
    pub fn verdict(&self, rejected_status: i32) -> IssueVerdict {
        if let Some(fault) = self.fault.as_ref().filter(|f| f.is_error()) {
            return IssueVerdict::Faulted(fault.clone());
        }
        match self.status {
            None | Some(ISSUE_SUCCESS_STATUS) => IssueVerdict::Ticketed,
            Some(s) if s == rejected_status => IssueVerdict::Rejected(s),
            Some(s) => IssueVerdict::Unrecognized(s),
        }
    }
}

/// Request/response contract with the flight-distribution API. No retries here.
#[async_trait]
pub trait UpstreamGateway: Send + Sync {
    /// Re-price an offer, returning the authoritative fare and a possibly new binding.
    async fn requote(&self, binding: &OfferBinding) -> Result<RequoteResponse, UpstreamError>;

    /// Create a non-ticketed booking. Only for non-LCC offers.
    async fn reserve(
        &self,
        binding: &OfferBinding,
        passengers: &[ReservePassenger],
    ) -> Result<ReserveResponse, UpstreamError>;

    /// Finalize ticketing.
    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, UpstreamError>;

    /// One-way search, used only to recover an expired session.
    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, UpstreamError>;
}
