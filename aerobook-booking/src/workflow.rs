use aerobook_core::passenger::{IssuePassenger, PassengerFare, ReservePassenger};
use aerobook_core::{
    AncillaryEntry, AncillarySelections, BookingError, FareBreakdown, LegDescriptor, LegKey,
    PassengerRecord, TripShape,
};
use aerobook_shared::models::events::{BookingSettledEvent, LegFailureSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BookingStatus, LegConfirmation, LegReport, LegRun, WorkflowState};

/// Everything needed to start a booking, supplied once the traveler form is complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Reusing an id picks up bindings persisted by an earlier session.
    pub workflow_id: Option<Uuid>,
    pub shape: TripShape,
    pub legs: Vec<LegDescriptor>,
    pub passengers: Vec<PassengerRecord>,
    #[serde(default)]
    pub ancillaries: Vec<AncillaryEntry>,
}

/// Explicit state of one booking: its legs, travelers and ancillaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingWorkflow {
    pub id: Uuid,
    pub shape: TripShape,
    pub legs: Vec<LegRun>,
    pub passengers: Vec<PassengerRecord>,
    pub ancillaries: AncillarySelections,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingWorkflow {
    pub fn new(request: BookingRequest) -> Result<Self, BookingError> {
        if !request.shape.accepts(request.legs.len()) {
            return Err(BookingError::ValidationPrecondition(format!(
                "{} booking cannot have {} leg(s)",
                request.shape,
                request.legs.len()
            )));
        }
        if request.passengers.is_empty() {
            return Err(BookingError::ValidationPrecondition(
                "at least one passenger is required".to_string(),
            ));
        }

        let shape = request.shape;
        let legs = request
            .legs
            .into_iter()
            .enumerate()
            .map(|(index, leg)| LegRun::new(index, shape.leg_key(index), leg))
            .collect();

        let now = Utc::now();
        Ok(Self {
            id: request.workflow_id.unwrap_or_else(Uuid::new_v4),
            shape,
            legs,
            passengers: request.passengers,
            ancillaries: AncillarySelections::from(request.ancillaries),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn merge_ancillaries(&mut self, entries: impl IntoIterator<Item = AncillaryEntry>) {
        self.ancillaries.merge_all(entries);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Legs the API flags as needing a meal before they may be ticketed.
    pub fn missing_meals(&self) -> Vec<LegKey> {
        self.legs
            .iter()
            .filter(|leg| leg.state != WorkflowState::Issued)
            .filter(|leg| leg.quote.as_ref().map(|q| q.flags.meal_mandatory).unwrap_or(false))
            .filter(|leg| !self.ancillaries.has_meal(leg.key))
            .map(|leg| leg.key)
            .collect()
    }

    /// Refuses the whole booking while any leg still needs a mandatory meal.
    pub fn check_meal_gate(&self) -> Result<(), BookingError> {
        let missing = self.missing_meals();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BookingError::ValidationPrecondition(format!(
                "meal selection is mandatory for legs {:?}",
                missing
            )))
        }
    }

    pub fn is_complete(&self) -> bool {
        self.legs.iter().all(|l| l.state == WorkflowState::Issued)
    }

    pub fn status(&self) -> BookingStatus {
        let issued = self.legs.iter().filter(|l| l.state == WorkflowState::Issued).count();
        let failed = self.legs.iter().any(|l| l.state == WorkflowState::Failed);
        match (issued, failed) {
            (n, _) if n == self.legs.len() => BookingStatus::Confirmed,
            (0, true) => BookingStatus::Failed,
            (0, false) => BookingStatus::Pending,
            _ => BookingStatus::PartiallyConfirmed,
        }
    }

    pub fn outcome(&self) -> BookingOutcome {
        let confirmations: Vec<LegConfirmation> = self
            .legs
            .iter()
            .filter_map(|l| l.confirmation.clone())
            .collect();

        let total = confirmations
            .iter()
            .map(|c| c.fare.published_fare + c.ancillary_total)
            .sum();
        let currency = confirmations
            .first()
            .map(|c| c.fare.currency.clone())
            .or_else(|| self.legs.first().map(|l| l.original.fare.currency.clone()))
            .unwrap_or_default();

        BookingOutcome {
            workflow_id: self.id,
            shape: self.shape,
            status: self.status(),
            legs: self.legs.iter().map(LegReport::from).collect(),
            booking_references: confirmations.iter().map(|c| c.pnr.clone()).collect(),
            booking_ids: confirmations.iter().map(|c| c.booking_id.clone()).collect(),
            confirmations,
            total,
            currency,
        }
    }
}

/// Passenger list for Reserve, priced from the authoritative fare.
pub(crate) fn reserve_passengers(
    passengers: &[PassengerRecord],
    fare: &FareBreakdown,
) -> Result<Vec<ReservePassenger>, BookingError> {
    let fares = PassengerFare::split(fare, passengers)?;
    Ok(passengers
        .iter()
        .zip(fares)
        .map(|(p, fare)| ReservePassenger {
            identity: p.clone(),
            fare,
        })
        .collect())
}

/// Passenger list for Issue, with each traveler's ancillaries on `leg`.
pub(crate) fn issue_passengers(
    passengers: &[PassengerRecord],
    fare: &FareBreakdown,
    ancillaries: &AncillarySelections,
    leg: LegKey,
) -> Result<Vec<IssuePassenger>, BookingError> {
    let fares = PassengerFare::split(fare, passengers)?;
    Ok(passengers
        .iter()
        .zip(fares)
        .enumerate()
        .map(|(i, (p, fare))| IssuePassenger {
            identity: p.clone(),
            fare,
            ancillaries: ancillaries.for_passenger(leg, i),
        })
        .collect())
}

/// Aggregate result handed to the confirmation screen, full or partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOutcome {
    pub workflow_id: Uuid,
    pub shape: TripShape,
    pub status: BookingStatus,
    pub legs: Vec<LegReport>,
    pub confirmations: Vec<LegConfirmation>,
    pub booking_references: Vec<String>,
    pub booking_ids: Vec<String>,
    /// Issued legs' published fares plus their ancillaries, minor units.
    pub total: i64,
    pub currency: String,
}

impl BookingOutcome {
    pub fn failed_leg(&self) -> Option<&LegReport> {
        self.legs.iter().find(|l| l.failure.is_some())
    }

    pub fn to_event(&self) -> BookingSettledEvent {
        BookingSettledEvent {
            workflow_id: self.workflow_id,
            trip_shape: self.shape.to_string(),
            status: self.status.to_string(),
            booking_references: self.booking_references.clone(),
            booking_ids: self.booking_ids.clone(),
            failed_leg: self.failed_leg().and_then(|leg| {
                leg.failure.as_ref().map(|f| LegFailureSummary {
                    leg_index: leg.index,
                    stage: f.stage.to_string(),
                    error_kind: f.kind.to_string(),
                    message: f.message.clone(),
                })
            }),
            total_minor: self.total,
            currency: self.currency.clone(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;
    use crate::testing::{descriptor, fare, passenger, quote};
    use aerobook_core::{AncillaryKind, AncillarySelection};

    fn round_trip() -> BookingWorkflow {
        BookingWorkflow::new(BookingRequest {
            workflow_id: None,
            shape: TripShape::RoundTrip,
            legs: vec![
                descriptor("DEL", "BOM", 10, 8, 0),
                descriptor("BOM", "DEL", 14, 19, 30),
            ],
            passengers: vec![passenger("Meera")],
            ancillaries: vec![],
        })
        .unwrap()
    }

    fn meal(leg: LegKey) -> AncillaryEntry {
        AncillaryEntry {
            leg,
            passenger_index: 0,
            selection: AncillarySelection {
                kind: AncillaryKind::Meal,
                code: "VGML".to_string(),
                description: None,
                price: 250,
            },
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = BookingWorkflow::new(BookingRequest {
            workflow_id: None,
            shape: TripShape::RoundTrip,
            legs: vec![descriptor("DEL", "BOM", 10, 8, 0)],
            passengers: vec![passenger("Meera")],
            ancillaries: vec![],
        });
        assert!(matches!(result, Err(BookingError::ValidationPrecondition(_))));
    }

    #[test]
    fn test_round_trip_leg_tags() {
        let workflow = round_trip();
        assert_eq!(workflow.legs[0].key, LegKey::Outbound);
        assert_eq!(workflow.legs[1].key, LegKey::Return);
        assert_eq!(workflow.status(), BookingStatus::Pending);
    }

    #[test]
    fn test_meal_gate_lists_every_missing_leg() {
        let mut workflow = round_trip();
        workflow.legs[0].mark_quoted(quote(false, true)).unwrap();
        workflow.legs[1].mark_quoted(quote(false, true)).unwrap();

        assert_eq!(workflow.missing_meals(), vec![LegKey::Outbound, LegKey::Return]);
        assert!(workflow.check_meal_gate().is_err());

        workflow.merge_ancillaries(vec![meal(LegKey::Outbound), meal(LegKey::Return)]);
        assert!(workflow.check_meal_gate().is_ok());
    }

    #[test]
    fn test_passenger_fares_add_up_to_requote_total() {
        let quoted = fare(5600);
        let passengers = vec![passenger("Meera"), passenger("Arjun")];

        let reserve = reserve_passengers(&passengers, &quoted).unwrap();
        let reserved: i64 = reserve.iter().map(|p| p.fare.base_fare + p.fare.tax).sum();
        assert_eq!(reserved, quoted.published_fare);
        assert!(reserve.iter().all(|p| p.fare.base_fare > 0 && p.fare.tax > 0));

        let issue =
            issue_passengers(&passengers, &quoted, &AncillarySelections::new(), LegKey::OneWay).unwrap();
        let issued: i64 = issue.iter().map(|p| p.fare.base_fare + p.fare.tax).sum();
        assert_eq!(issued, quoted.published_fare);
    }

    #[test]
    fn test_partial_outcome_keeps_confirmation() {
        let mut workflow = round_trip();
        let outbound = &mut workflow.legs[0];
        outbound.mark_quoted(quote(true, false)).unwrap();
        outbound
            .mark_issued(LegConfirmation {
                leg_index: 0,
                leg: LegKey::Outbound,
                route: "DEL-BOM".to_string(),
                pnr: "PNR111".to_string(),
                booking_id: "9001".to_string(),
                is_lcc: true,
                fare: quote(true, false).fare,
                ancillary_total: 250,
                itinerary: serde_json::json!({}),
                issued_at: Utc::now(),
            })
            .unwrap();
        workflow.legs[1].mark_failed(
            Stage::Issue,
            &BookingError::UpstreamBusiness {
                code: 12,
                message: "Fare not available".to_string(),
            },
        );

        let outcome = workflow.outcome();
        assert_eq!(outcome.status, BookingStatus::PartiallyConfirmed);
        assert_eq!(outcome.booking_references, vec!["PNR111".to_string()]);
        assert_eq!(outcome.total, 5600 + 250);
        assert_eq!(outcome.failed_leg().map(|l| l.index), Some(1));

        let event = outcome.to_event();
        assert_eq!(event.status, "PARTIALLY_CONFIRMED");
        assert_eq!(event.failed_leg.unwrap().error_kind, "UPSTREAM_BUSINESS_ERROR");
    }
}
