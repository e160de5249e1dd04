use aerobook_core::{BookingError, SessionStore, TripShape};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::WorkflowState;
use crate::orchestrator::WorkflowScope;
use crate::sequencer::StageSequencer;
use crate::workflow::{BookingOutcome, BookingRequest, BookingWorkflow};

/// Runs every leg of a booking in order and aggregates the result.
///
/// All legs are requoted first, then the mandatory-meal gate is checked for
/// the whole booking, and only then are legs reserved and issued one by one.
/// A leg failure stops the run; legs issued before it stay issued.
pub struct LegCoordinator {
    sequencer: StageSequencer,
}

impl LegCoordinator {
    pub fn new(sequencer: StageSequencer) -> Self {
        Self { sequencer }
    }

    pub fn sequencer(&self) -> &StageSequencer {
        &self.sequencer
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        self.sequencer.orchestrator().store()
    }

    /// Builds the workflow and lines its bindings up with the session store:
    /// a binding stored for a leg wins over the request's, missing entries are seeded.
    pub async fn prepare(&self, request: BookingRequest) -> Result<BookingWorkflow, BookingError> {
        let mut workflow = BookingWorkflow::new(request)?;
        let id = workflow.id;
        let store = self.store();

        for leg in workflow.legs.iter_mut() {
            match store.leg_binding(id, leg.index).await? {
                Some(stored) if &stored != leg.binding() => {
                    info!(
                        workflow_id = %id,
                        leg = leg.index,
                        "Using stored offer {} instead of {}",
                        stored.offer_handle,
                        leg.binding().offer_handle
                    );
                    leg.adopt(stored);
                }
                Some(_) => {}
                None => store.set_leg_binding(id, leg.index, leg.binding()).await?,
            }
        }

        if workflow.shape != TripShape::MultiCity && store.token(id).await?.is_none() {
            if let Some(first) = workflow.legs.first() {
                store.set_token(id, &first.binding().session_token).await?;
            }
        }

        Ok(workflow)
    }

    /// Drives every leg that is not yet issued. Returns `Err` only when the
    /// booking is refused as a whole; leg failures are reported in the outcome.
    pub async fn run(&self, workflow: &mut BookingWorkflow) -> Result<BookingOutcome, BookingError> {
        let result = self.drive(workflow).await;
        workflow.touch();
        result?;

        let outcome = workflow.outcome();
        info!(
            workflow_id = %workflow.id,
            status = %outcome.status,
            "Booking settled with {} of {} leg(s) issued",
            outcome.confirmations.len(),
            workflow.legs.len()
        );
        Ok(outcome)
    }

    /// Reopens failed legs and runs the workflow again. Issued legs are never
    /// touched; a leg that was already reserved goes straight to Issue.
    pub async fn resume(&self, workflow: &mut BookingWorkflow) -> Result<BookingOutcome, BookingError> {
        for leg in workflow.legs.iter_mut() {
            if leg.state == WorkflowState::Failed {
                leg.reopen()?;
                info!(workflow_id = %workflow.id, leg = leg.index, "Reopened leg at {}", leg.state);
            }
        }
        self.run(workflow).await
    }

    async fn drive(&self, workflow: &mut BookingWorkflow) -> Result<(), BookingError> {
        let scope = WorkflowScope {
            workflow_id: workflow.id,
            shape: workflow.shape,
            passengers: &workflow.passengers,
        };

        for leg in workflow.legs.iter_mut() {
            if leg.state == WorkflowState::Failed {
                warn!(workflow_id = %scope.workflow_id, leg = leg.index, "Leg failed earlier, resume required");
                return Ok(());
            }
            if leg.state != WorkflowState::Selected {
                continue;
            }
            if self.sequencer.requote(&scope, leg).await.is_err() {
                return Ok(());
            }
        }

        workflow.check_meal_gate()?;

        let ancillaries = &workflow.ancillaries;
        for leg in workflow.legs.iter_mut() {
            if leg.state == WorkflowState::Issued {
                continue;
            }
            if let Err(e) = self.sequencer.complete(&scope, leg, ancillaries).await {
                warn!(
                    workflow_id = %scope.workflow_id,
                    leg = leg.index,
                    "Stopping after leg failure: {}",
                    e
                );
                return Ok(());
            }
        }

        Ok(())
    }
}
