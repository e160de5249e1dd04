use aerobook_booking::{BookingOutcome, BookingRequest, BookingWorkflow};
use aerobook_core::{AncillaryEntry, AncillarySelections, BookingError, LegKey, OfferBinding};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{AppState, WorkflowSlot};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct AncillaryResponse {
    pub workflow_id: Uuid,
    pub ancillaries: AncillarySelections,
    /// Legs that still need a meal before they can be ticketed.
    pub missing_meals: Vec<LegKey>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LegSession {
    pub index: usize,
    pub binding: Option<OfferBinding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub workflow_id: Uuid,
    /// Booking-wide token; absent for multi-city bookings.
    pub token: Option<String>,
    pub legs: Vec<LegSession>,
}

enum Drive {
    Run,
    Resume,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/ancillaries", post(add_ancillaries))
        .route("/v1/bookings/{id}/resume", post(resume_booking))
        .route("/v1/bookings/{id}/session", get(get_session))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
/// Start a booking and drive every leg as far as it goes
async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingOutcome>), AppError> {
    if let Some(id) = req.workflow_id {
        if state.workflows.read().await.contains_key(&id) {
            return Err(AppError::ConflictError(format!("Booking {} already exists", id)));
        }
    }

    let workflow = state.coordinator.prepare(req).await?;
    {
        let mut workflows = state.workflows.write().await;
        match workflows.entry(workflow.id) {
            Entry::Occupied(_) => {
                return Err(AppError::ConflictError(format!(
                    "Booking {} already exists",
                    workflow.id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(WorkflowSlot::Running {
                    legs: workflow.legs.len(),
                });
            }
        }
    }

    let outcome = drive(&state, workflow, Drive::Run).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingOutcome>, AppError> {
    let workflows = state.workflows.read().await;
    match workflows.get(&id) {
        Some(WorkflowSlot::Idle(workflow)) => Ok(Json(workflow.outcome())),
        Some(WorkflowSlot::Running { .. }) => Err(in_progress(id)),
        None => Err(not_found(id)),
    }
}

/// POST /v1/bookings/{id}/ancillaries
/// Merge meal, baggage and seat selections; the last choice per slot wins
async fn add_ancillaries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(entries): Json<Vec<AncillaryEntry>>,
) -> Result<Json<AncillaryResponse>, AppError> {
    let mut workflows = state.workflows.write().await;
    let workflow = match workflows.get_mut(&id) {
        Some(WorkflowSlot::Idle(workflow)) => workflow,
        Some(WorkflowSlot::Running { .. }) => return Err(in_progress(id)),
        None => return Err(not_found(id)),
    };

    for entry in &entries {
        if !workflow.legs.iter().any(|l| l.key == entry.leg) {
            return Err(AppError::ValidationError(format!(
                "Booking {} has no leg {:?}",
                id, entry.leg
            )));
        }
        if entry.passenger_index >= workflow.passengers.len() {
            return Err(AppError::ValidationError(format!(
                "Booking {} has no passenger {}",
                id, entry.passenger_index
            )));
        }
    }

    workflow.merge_ancillaries(entries);
    tracing::info!("Ancillaries updated for booking {}", id);

    Ok(Json(AncillaryResponse {
        workflow_id: id,
        ancillaries: workflow.ancillaries.clone(),
        missing_meals: workflow.missing_meals(),
    }))
}

/// POST /v1/bookings/{id}/resume
/// Retry the legs that are not ticketed yet
async fn resume_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingOutcome>, AppError> {
    let workflow = {
        let mut workflows = state.workflows.write().await;
        let slot = workflows.get_mut(&id).ok_or_else(|| not_found(id))?;
        let legs = match slot {
            WorkflowSlot::Idle(workflow) => workflow.legs.len(),
            WorkflowSlot::Running { .. } => return Err(in_progress(id)),
        };
        match std::mem::replace(slot, WorkflowSlot::Running { legs }) {
            WorkflowSlot::Idle(workflow) => *workflow,
            WorkflowSlot::Running { .. } => return Err(in_progress(id)),
        }
    };

    if workflow.is_complete() {
        let outcome = workflow.outcome();
        park(&state, workflow).await;
        return Ok(Json(outcome));
    }

    let outcome = drive(&state, workflow, Drive::Resume).await?;
    Ok(Json(outcome))
}

/// GET /v1/bookings/{id}/session
/// Session token and per-leg bindings as currently persisted
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let legs = match state.workflows.read().await.get(&id) {
        Some(WorkflowSlot::Idle(workflow)) => workflow.legs.len(),
        Some(WorkflowSlot::Running { legs }) => *legs,
        None => return Err(not_found(id)),
    };

    let store = state.coordinator.store();
    let token = store.token(id).await.map_err(BookingError::from)?;
    let mut sessions = Vec::with_capacity(legs);
    for index in 0..legs {
        let binding = store.leg_binding(id, index).await.map_err(BookingError::from)?;
        sessions.push(LegSession { index, binding });
    }

    Ok(Json(SessionResponse {
        workflow_id: id,
        token,
        legs: sessions,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Drives the workflow on its own task so a dropped request cannot strand it
/// half way, then parks it again and publishes the outcome.
async fn drive(
    state: &AppState,
    mut workflow: BookingWorkflow,
    mode: Drive,
) -> Result<BookingOutcome, AppError> {
    let coordinator = state.coordinator.clone();
    let id = workflow.id;

    let handle = tokio::spawn(async move {
        let result = match mode {
            Drive::Run => coordinator.run(&mut workflow).await,
            Drive::Resume => coordinator.resume(&mut workflow).await,
        };
        (workflow, result)
    });

    let (workflow, result) = match handle.await {
        Ok(done) => done,
        Err(e) => {
            state.workflows.write().await.remove(&id);
            return Err(AppError::InternalServerError(format!(
                "Booking {} task failed: {}",
                id, e
            )));
        }
    };
    park(state, workflow).await;

    let outcome = result?;
    if let Err(e) = state.events.booking_settled(&outcome.to_event()).await {
        tracing::warn!("Failed to publish settlement for {}: {}", id, e);
    }
    Ok(outcome)
}

async fn park(state: &AppState, workflow: BookingWorkflow) {
    state
        .workflows
        .write()
        .await
        .insert(workflow.id, WorkflowSlot::Idle(Box::new(workflow)));
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFoundError(format!("Booking {} not found", id))
}

fn in_progress(id: Uuid) -> AppError {
    AppError::ConflictError(format!("Booking {} is being processed", id))
}
