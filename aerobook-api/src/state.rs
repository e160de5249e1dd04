use aerobook_booking::{
    BookingWorkflow, LegCoordinator, RecoveryOrchestrator, RetryPolicy, StageSequencer,
};
use aerobook_core::events::BookingEventPublisher;
use aerobook_core::{SessionStore, UpstreamGateway};
use aerobook_store::app_config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A workflow is either parked between requests or being driven by one.
pub enum WorkflowSlot {
    Idle(Box<BookingWorkflow>),
    Running { legs: usize },
}

pub type WorkflowMap = Arc<RwLock<HashMap<Uuid, WorkflowSlot>>>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<LegCoordinator>,
    pub workflows: WorkflowMap,
    pub events: Arc<dyn BookingEventPublisher>,
}

impl AppState {
    pub fn new(coordinator: LegCoordinator, events: Arc<dyn BookingEventPublisher>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            workflows: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }
}

pub fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.retry.max_attempts,
        initial_delay: config.retry.initial_delay(),
        call_timeout: config.upstream.call_timeout(),
    }
}

/// Wires gateway, session store and event sink into a coordinator per `config`.
pub fn build_coordinator(
    config: &Config,
    gateway: Arc<dyn UpstreamGateway>,
    store: Arc<dyn SessionStore>,
    events: Arc<dyn BookingEventPublisher>,
) -> LegCoordinator {
    let orchestrator = RecoveryOrchestrator::new(gateway, store)
        .with_policy(retry_policy(config))
        .with_classifier(config.upstream.classifier())
        .with_events(events);
    let sequencer =
        StageSequencer::new(orchestrator).with_rejected_status(config.upstream.issue_rejected_status);
    LegCoordinator::new(sequencer)
}
