use aerobook_core::gateway::ValidationFlags;
use aerobook_core::{BookingError, ErrorKind, FareBreakdown, LegDescriptor, LegKey, OfferBinding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream call a leg is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Requote,
    Reserve,
    Issue,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Requote => "REQUOTE",
            Stage::Reserve => "RESERVE",
            Stage::Issue => "ISSUE",
        };
        f.write_str(name)
    }
}

/// Leg lifecycle. Strictly forward; `Reserved` is skipped for LCC legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Selected,
    Quoted,
    Reserved,
    Issued,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Issued | WorkflowState::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_uppercase())
    }
}

/// Authoritative pricing from Requote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub is_lcc: bool,
    pub fare: FareBreakdown,
    pub flags: ValidationFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub booking_id: String,
    pub pnr: String,
}

/// Ticketing result of one leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegConfirmation {
    pub leg_index: usize,
    pub leg: LegKey,
    pub route: String,
    pub pnr: String,
    pub booking_id: String,
    pub is_lcc: bool,
    pub fare: FareBreakdown,
    pub ancillary_total: i64,
    pub itinerary: serde_json::Value,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// One leg of a booking workflow and everything it has reached so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegRun {
    pub index: usize,
    pub key: LegKey,
    /// Leg as the user chose it; recovery always searches on this one.
    pub original: LegDescriptor,
    /// Same leg bound to the binding currently in use.
    pub current: LegDescriptor,
    pub state: WorkflowState,
    pub quote: Option<Quote>,
    pub reservation: Option<Reservation>,
    pub confirmation: Option<LegConfirmation>,
    pub failure: Option<LegFailure>,
    pub recoveries: u32,
}

impl LegRun {
    pub fn new(index: usize, key: LegKey, leg: LegDescriptor) -> Self {
        Self {
            index,
            key,
            current: leg.clone(),
            original: leg,
            state: WorkflowState::Selected,
            quote: None,
            reservation: None,
            confirmation: None,
            failure: None,
            recoveries: 0,
        }
    }

    pub fn binding(&self) -> &OfferBinding {
        &self.current.binding
    }

    /// Replaces the token/handle pair of the current descriptor.
    pub fn adopt(&mut self, binding: OfferBinding) {
        self.current = self.current.rebind(binding);
    }

    pub fn is_lcc(&self) -> bool {
        self.quote.as_ref().map(|q| q.is_lcc).unwrap_or(self.original.is_lcc)
    }

    /// Transition: Selected → Quoted
    pub fn mark_quoted(&mut self, quote: Quote) -> Result<(), BookingError> {
        self.require(&[WorkflowState::Selected], WorkflowState::Quoted)?;
        self.quote = Some(quote);
        self.state = WorkflowState::Quoted;
        Ok(())
    }

    /// Transition: Quoted → Reserved (non-LCC only)
    pub fn mark_reserved(&mut self, reservation: Reservation) -> Result<(), BookingError> {
        self.require(&[WorkflowState::Quoted], WorkflowState::Reserved)?;
        if self.is_lcc() {
            return Err(self.invalid(WorkflowState::Reserved));
        }
        self.reservation = Some(reservation);
        self.state = WorkflowState::Reserved;
        Ok(())
    }

    /// Transition: Reserved → Issued, or Quoted → Issued for LCC legs
    pub fn mark_issued(&mut self, confirmation: LegConfirmation) -> Result<(), BookingError> {
        self.ensure_issuable()?;
        self.confirmation = Some(confirmation);
        self.state = WorkflowState::Issued;
        Ok(())
    }

    /// Any non-terminal state → Failed. Progress (quote, reservation) is kept.
    pub fn mark_failed(&mut self, stage: Stage, error: &BookingError) {
        if self.state.is_terminal() {
            return;
        }
        self.failure = Some(LegFailure {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        });
        self.state = WorkflowState::Failed;
    }

    /// Failed → Reserved when a reservation exists (never reserve twice),
    /// otherwise Failed → Selected so the leg is requoted.
    pub fn reopen(&mut self) -> Result<(), BookingError> {
        if self.state != WorkflowState::Failed {
            return Err(self.invalid(WorkflowState::Selected));
        }
        self.failure = None;
        if self.reservation.is_some() {
            self.state = WorkflowState::Reserved;
        } else {
            self.quote = None;
            self.state = WorkflowState::Selected;
        }
        Ok(())
    }

    pub fn ensure_issuable(&self) -> Result<(), BookingError> {
        match self.state {
            WorkflowState::Reserved => Ok(()),
            WorkflowState::Quoted if self.is_lcc() => Ok(()),
            _ => Err(self.invalid(WorkflowState::Issued)),
        }
    }

    pub(crate) fn require(
        &self,
        allowed: &[WorkflowState],
        to: WorkflowState,
    ) -> Result<(), BookingError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: WorkflowState) -> BookingError {
        BookingError::InvalidTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Nothing ticketed and nothing failed yet.
    Pending,
    Confirmed,
    /// Some legs ticketed, a later one failed. Resume only the rest.
    PartiallyConfirmed,
    Failed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::PartiallyConfirmed => "PARTIALLY_CONFIRMED",
            BookingStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegReport {
    pub index: usize,
    pub leg: LegKey,
    pub route: String,
    pub state: WorkflowState,
    pub pnr: Option<String>,
    pub booking_id: Option<String>,
    pub failure: Option<LegFailure>,
    pub price_changed: bool,
    pub recoveries: u32,
}

impl From<&LegRun> for LegReport {
    fn from(run: &LegRun) -> Self {
        Self {
            index: run.index,
            leg: run.key,
            route: run.original.route(),
            state: run.state,
            pnr: run
                .confirmation
                .as_ref()
                .map(|c| c.pnr.clone())
                .or_else(|| run.reservation.as_ref().map(|r| r.pnr.clone())),
            booking_id: run
                .confirmation
                .as_ref()
                .map(|c| c.booking_id.clone())
                .or_else(|| run.reservation.as_ref().map(|r| r.booking_id.clone())),
            failure: run.failure.clone(),
            price_changed: run.quote.as_ref().map(|q| q.flags.price_changed).unwrap_or(false),
            recoveries: run.recoveries,
        }
    }
}
