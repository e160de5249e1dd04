use aerobook_core::gateway::{
    IssueRequest, IssueVerdict, ReserveResponse, ISSUE_REJECTED_STATUS,
};
use aerobook_core::{AncillarySelections, BookingError, ErrorClassifier};
use chrono::Utc;
use tracing::{info, warn};

use crate::models::{LegConfirmation, LegRun, Quote, Reservation, Stage, WorkflowState};
use crate::orchestrator::{RecoveryOrchestrator, WorkflowScope};
use crate::workflow::{issue_passengers, reserve_passengers};

/// Drives one leg through Requote → Reserve → Issue, every call going through
/// the recovery orchestrator. Reserve is skipped for low-cost-carrier offers.
pub struct StageSequencer {
    orchestrator: RecoveryOrchestrator,
    rejected_status: i32,
}

impl StageSequencer {
    pub fn new(orchestrator: RecoveryOrchestrator) -> Self {
        Self {
            orchestrator,
            rejected_status: ISSUE_REJECTED_STATUS,
        }
    }

    pub fn with_rejected_status(mut self, status: i32) -> Self {
        self.rejected_status = status;
        self
    }

    pub fn orchestrator(&self) -> &RecoveryOrchestrator {
        &self.orchestrator
    }

    /// Full sequence for a freshly selected leg.
    pub async fn run(
        &self,
        scope: &WorkflowScope<'_>,
        leg: &mut LegRun,
        ancillaries: &AncillarySelections,
    ) -> Result<(), BookingError> {
        self.requote(scope, leg).await?;
        self.complete(scope, leg, ancillaries).await
    }

    /// Reserve (when needed) and Issue for a leg that is already quoted or reserved.
    pub async fn complete(
        &self,
        scope: &WorkflowScope<'_>,
        leg: &mut LegRun,
        ancillaries: &AncillarySelections,
    ) -> Result<(), BookingError> {
        if leg.state == WorkflowState::Quoted && !leg.is_lcc() {
            self.reserve(scope, leg).await?;
        }
        self.issue(scope, leg, ancillaries).await
    }

    /// Transition: Selected → Quoted
    pub async fn requote(
        &self,
        scope: &WorkflowScope<'_>,
        leg: &mut LegRun,
    ) -> Result<(), BookingError> {
        leg.require(&[WorkflowState::Selected], WorkflowState::Quoted)?;

        let gateway = self.orchestrator.gateway();
        let classifier = self.orchestrator.classifier();
        let result = self
            .orchestrator
            .execute(scope, leg, Stage::Requote, move |binding| async move {
                gateway
                    .requote(&binding)
                    .await
                    .map_err(|e| classifier.classify(e))
            })
            .await;

        let response = match result {
            Ok((response, _)) => response,
            Err(e) => {
                leg.mark_failed(Stage::Requote, &e);
                return Err(e);
            }
        };

        if response.flags.price_changed {
            warn!(
                workflow_id = %scope.workflow_id,
                leg = leg.index,
                "Fare changed on requote: {} -> {} {}",
                leg.original.fare.published_fare,
                response.fare.published_fare,
                response.fare.currency
            );
        }
        if response.flags.schedule_changed {
            warn!(workflow_id = %scope.workflow_id, leg = leg.index, "Schedule changed on requote");
        }

        let binding = &response.binding;
        if !binding.session_token.is_empty() && !binding.offer_handle.is_empty() {
            leg.adopt(binding.clone());
            if let Err(e) = self.orchestrator.persist(scope, leg.index, binding).await {
                leg.mark_failed(Stage::Requote, &e);
                return Err(e);
            }
        }

        info!(
            workflow_id = %scope.workflow_id,
            leg = leg.index,
            lcc = response.is_lcc,
            "Quoted {} at {} {}",
            leg.original.route(),
            response.fare.published_fare,
            response.fare.currency
        );

        leg.mark_quoted(Quote {
            is_lcc: response.is_lcc,
            fare: response.fare,
            flags: response.flags,
        })
    }

    /// Transition: Quoted → Reserved
    pub async fn reserve(
        &self,
        scope: &WorkflowScope<'_>,
        leg: &mut LegRun,
    ) -> Result<(), BookingError> {
        leg.require(&[WorkflowState::Quoted], WorkflowState::Reserved)?;
        let quote = match leg.quote.clone() {
            Some(q) if !q.is_lcc => q,
            _ => {
                return Err(BookingError::InvalidTransition {
                    from: leg.state.to_string(),
                    to: WorkflowState::Reserved.to_string(),
                })
            }
        };

        let passengers = match reserve_passengers(scope.passengers, &quote.fare) {
            Ok(passengers) => passengers,
            Err(e) => {
                leg.mark_failed(Stage::Reserve, &e);
                return Err(e);
            }
        };
        let pax = passengers.as_slice();
        let gateway = self.orchestrator.gateway();
        let classifier = self.orchestrator.classifier();
        let result = self
            .orchestrator
            .execute(scope, leg, Stage::Reserve, move |binding| async move {
                let response = gateway
                    .reserve(&binding, pax)
                    .await
                    .map_err(|e| classifier.classify(e))?;
                reservation_from(response, classifier)
            })
            .await;

        match result {
            Ok((reservation, _)) => {
                info!(
                    workflow_id = %scope.workflow_id,
                    leg = leg.index,
                    "Reserved {} as booking {} / PNR {}",
                    leg.original.route(),
                    reservation.booking_id,
                    reservation.pnr
                );
                leg.mark_reserved(reservation)
            }
            Err(e) => {
                leg.mark_failed(Stage::Reserve, &e);
                Err(e)
            }
        }
    }

    /// Transition: Reserved → Issued, or Quoted → Issued for LCC legs
    pub async fn issue(
        &self,
        scope: &WorkflowScope<'_>,
        leg: &mut LegRun,
        ancillaries: &AncillarySelections,
    ) -> Result<(), BookingError> {
        leg.ensure_issuable()?;
        let Some(quote) = leg.quote.clone() else {
            return Err(BookingError::InvalidTransition {
                from: leg.state.to_string(),
                to: WorkflowState::Issued.to_string(),
            });
        };

        if quote.flags.meal_mandatory && !ancillaries.has_meal(leg.key) {
            let err = BookingError::ValidationPrecondition(format!(
                "meal selection is mandatory for leg {}",
                leg.index
            ));
            leg.mark_failed(Stage::Issue, &err);
            return Err(err);
        }

        let (booking_id, pnr) = match (&leg.reservation, quote.is_lcc) {
            (Some(r), false) => (r.booking_id.clone(), r.pnr.clone()),
            _ => (String::new(), String::new()),
        };
        let passengers = match issue_passengers(scope.passengers, &quote.fare, ancillaries, leg.key) {
            Ok(passengers) => passengers,
            Err(e) => {
                leg.mark_failed(Stage::Issue, &e);
                return Err(e);
            }
        };

        let is_lcc = quote.is_lcc;
        let rejected = self.rejected_status;
        let (id_ref, pnr_ref, pax) = (booking_id.as_str(), pnr.as_str(), passengers.as_slice());
        let gateway = self.orchestrator.gateway();
        let classifier = self.orchestrator.classifier();
        let result = self
            .orchestrator
            .execute(scope, leg, Stage::Issue, move |binding| async move {
                let request = IssueRequest {
                    booking_id: id_ref.to_string(),
                    pnr: pnr_ref.to_string(),
                    binding,
                    is_lcc,
                    passengers: pax.to_vec(),
                };
                let response = gateway
                    .issue(&request)
                    .await
                    .map_err(|e| classifier.classify(e))?;
                match response.verdict(rejected) {
                    IssueVerdict::Ticketed => Ok(response),
                    IssueVerdict::Faulted(fault) => {
                        Err(classifier.classify_fault(fault.code, fault.message))
                    }
                    IssueVerdict::Rejected(status) => Err(BookingError::UpstreamBusiness {
                        code: status,
                        message: "ticket issuance rejected".to_string(),
                    }),
                    IssueVerdict::Unrecognized(status) => Err(BookingError::UpstreamBusiness {
                        code: status,
                        message: format!("unrecognized ticket status {}", status),
                    }),
                }
            })
            .await;

        let response = match result {
            Ok((response, _)) => response,
            Err(e) => {
                leg.mark_failed(Stage::Issue, &e);
                return Err(e);
            }
        };

        let confirmation = LegConfirmation {
            leg_index: leg.index,
            leg: leg.key,
            route: leg.original.route(),
            pnr: response.pnr.filter(|s| !s.is_empty()).unwrap_or(pnr),
            booking_id: response.booking_id.filter(|s| !s.is_empty()).unwrap_or(booking_id),
            is_lcc,
            fare: quote.fare,
            ancillary_total: ancillaries.total_for(leg.key),
            itinerary: response.itinerary,
            issued_at: Utc::now(),
        };

        info!(
            workflow_id = %scope.workflow_id,
            leg = leg.index,
            "Issued {} under PNR {}",
            confirmation.route,
            confirmation.pnr
        );

        leg.mark_issued(confirmation)
    }
}

/// A reservation needs a booking id or a PNR, and no business error.
fn reservation_from(
    response: ReserveResponse,
    classifier: &ErrorClassifier,
) -> Result<Reservation, BookingError> {
    if let Some(fault) = response.fault.filter(|f| f.is_error()) {
        return Err(classifier.classify_fault(fault.code, fault.message));
    }

    let booking_id = response.booking_id.filter(|s| !s.is_empty());
    let pnr = response.pnr.filter(|s| !s.is_empty());
    if booking_id.is_none() && pnr.is_none() {
        return Err(BookingError::UpstreamBusiness {
            code: 0,
            message: "reservation returned neither booking id nor PNR".to_string(),
        });
    }

    Ok(Reservation {
        booking_id: booking_id.unwrap_or_default(),
        pnr: pnr.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use aerobook_core::gateway::{IssueResponse, UpstreamFault};
    use aerobook_core::{
        ErrorKind, LegKey, MemorySessionStore, OfferBinding, PassengerRecord, SessionStore,
        TripShape, UpstreamError,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    fn sequencer(gateway: &Arc<ScriptedGateway>) -> StageSequencer {
        StageSequencer::new(RecoveryOrchestrator::new(
            gateway.clone(),
            Arc::new(MemorySessionStore::new()),
        ))
    }

    fn scope(passengers: &[PassengerRecord]) -> WorkflowScope<'_> {
        WorkflowScope {
            workflow_id: Uuid::new_v4(),
            shape: TripShape::OneWay,
            passengers,
        }
    }

    fn one_way() -> LegRun {
        LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0))
    }

    #[tokio::test]
    async fn test_lcc_leg_skips_reserve() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB-LCC", true))).await;
        gateway.push_issue(Ok(issue_ok("6EPNR1"))).await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap();

        assert_eq!(leg.state, WorkflowState::Issued);
        let calls = gateway.calls().await;
        assert!(!calls.iter().any(GatewayCall::is_reserve));
        assert_eq!(
            calls[1],
            GatewayCall::Issue {
                binding: OfferBinding::new("trace-2", "OB-LCC"),
                booking_id: String::new(),
                pnr: String::new(),
                is_lcc: true,
                ancillaries: 0,
            }
        );
        assert_eq!(leg.confirmation.as_ref().unwrap().pnr, "6EPNR1");
    }

    #[tokio::test]
    async fn test_requote_binding_is_persisted() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB2", false))).await;
        let store = Arc::new(MemorySessionStore::new());
        let sequencer = StageSequencer::new(RecoveryOrchestrator::new(gateway.clone(), store.clone()));
        let passengers = vec![passenger("Kavya")];
        let scope = scope(&passengers);
        let mut leg = one_way();

        sequencer.requote(&scope, &mut leg).await.unwrap();

        let adopted = OfferBinding::new("trace-2", "OB2");
        assert_eq!(leg.binding(), &adopted);
        assert_eq!(store.token(scope.workflow_id).await.unwrap().as_deref(), Some("trace-2"));
        assert_eq!(store.leg_binding(scope.workflow_id, 0).await.unwrap(), Some(adopted));
    }

    #[tokio::test]
    async fn test_unpriced_quote_never_reaches_reserve() {
        let gateway = Arc::new(ScriptedGateway::new());
        let mut requote = requote_ok("trace-2", "OB2", false);
        requote.fare.base_fare = 0;
        requote.fare.tax = 0;
        gateway.push_requote(Ok(requote)).await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        let err = sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UpstreamBusinessError);
        assert_eq!(leg.state, WorkflowState::Failed);
        assert!(!gateway.calls().await.iter().any(GatewayCall::is_reserve));
    }

    #[tokio::test]
    async fn test_full_sequence_threads_reservation() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB2", false))).await;
        gateway.push_reserve(Ok(reserve_ok("1500", "AIPNR9"))).await;
        gateway
            .push_issue(Ok(IssueResponse {
                status: None,
                ..IssueResponse::default()
            }))
            .await;
        let passengers = vec![passenger("Kavya"), passenger("Rohan")];
        let mut leg = one_way();

        sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap();

        let calls = gateway.calls().await;
        assert_eq!(
            calls[1],
            GatewayCall::Reserve {
                binding: OfferBinding::new("trace-2", "OB2"),
                passengers: 2
            }
        );
        assert!(matches!(
            &calls[2],
            GatewayCall::Issue { booking_id, pnr, is_lcc: false, .. } if booking_id == "1500" && pnr == "AIPNR9"
        ));
        // absent status counts as ticketed; references fall back to the reservation
        let confirmation = leg.confirmation.unwrap();
        assert_eq!(confirmation.pnr, "AIPNR9");
        assert_eq!(confirmation.booking_id, "1500");
    }

    #[tokio::test]
    async fn test_reserve_without_references_stops_leg() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB2", false))).await;
        gateway.push_reserve(Ok(ReserveResponse::default())).await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        let err = sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UpstreamBusinessError);
        assert_eq!(leg.state, WorkflowState::Failed);
        assert_eq!(leg.failure.as_ref().unwrap().stage, Stage::Reserve);
        assert!(!gateway.calls().await.iter().any(GatewayCall::is_issue));
    }

    #[tokio::test]
    async fn test_booking_already_exists_surfaced_once() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB2", false))).await;
        gateway
            .push_reserve(Ok(ReserveResponse {
                fault: Some(UpstreamFault {
                    code: 21,
                    message: "Booking is already done for the same criteria".to_string(),
                }),
                ..ReserveResponse::default()
            }))
            .await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        let err = sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BookingAlreadyExists);
        let reserves = gateway.calls().await.iter().filter(|c| c.is_reserve()).count();
        assert_eq!(reserves, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_recovers_expired_session() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB-LCC", true))).await;
        gateway
            .push_issue(Err(UpstreamError::Business {
                code: 6,
                message: "Session expired".to_string(),
            }))
            .await;
        gateway
            .push_search(Ok(search_result(
                "trace-3",
                vec![candidate("OB-fresh", vec![segment("DEL", "BOM", "AI", "865", 10, 8, 5)])],
            )))
            .await;
        gateway.push_issue(Ok(issue_ok("6EPNR2"))).await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap();

        let calls = gateway.calls().await;
        assert_eq!(calls.len(), 4);
        assert!(matches!(&calls[3], GatewayCall::Issue { binding, .. } if binding == &OfferBinding::new("trace-3", "OB-fresh")));
        assert_eq!(leg.recoveries, 1);
        assert_eq!(leg.state, WorkflowState::Issued);
    }

    #[tokio::test]
    async fn test_rejected_ticket_fails_leg() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB-LCC", true))).await;
        gateway
            .push_issue(Ok(IssueResponse {
                status: Some(ISSUE_REJECTED_STATUS),
                ..IssueResponse::default()
            }))
            .await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        let err = sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UpstreamBusinessError);
        assert_eq!(leg.failure.as_ref().unwrap().stage, Stage::Issue);
    }

    #[tokio::test]
    async fn test_issued_leg_is_not_reissued() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_requote(Ok(requote_ok("trace-2", "OB-LCC", true))).await;
        gateway.push_issue(Ok(issue_ok("6EPNR1"))).await;
        let passengers = vec![passenger("Kavya")];
        let scope = scope(&passengers);
        let sequencer = sequencer(&gateway);
        let mut leg = one_way();
        sequencer.run(&scope, &mut leg, &AncillarySelections::new()).await.unwrap();

        let again = sequencer.issue(&scope, &mut leg, &AncillarySelections::new()).await;

        assert!(matches!(again, Err(BookingError::InvalidTransition { .. })));
        assert_eq!(leg.state, WorkflowState::Issued);
        assert_eq!(gateway.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mandatory_meal_blocks_issue() {
        let gateway = Arc::new(ScriptedGateway::new());
        let mut requote = requote_ok("trace-2", "OB-LCC", true);
        requote.flags.meal_mandatory = true;
        gateway.push_requote(Ok(requote)).await;
        let passengers = vec![passenger("Kavya")];
        let mut leg = one_way();

        let err = sequencer(&gateway)
            .run(&scope(&passengers), &mut leg, &AncillarySelections::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationPrecondition);
        assert!(!gateway.calls().await.iter().any(GatewayCall::is_issue));
    }
}
