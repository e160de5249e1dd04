pub mod coordinator;
pub mod models;
pub mod orchestrator;
pub mod rematch;
pub mod sequencer;
pub mod testing;
pub mod workflow;

pub use coordinator::LegCoordinator;
pub use models::{BookingStatus, LegConfirmation, LegReport, LegRun, Stage, WorkflowState};
pub use orchestrator::{RecoveryOrchestrator, RetryPolicy, WorkflowScope};
pub use rematch::{FlightRematcher, Rematch};
pub use sequencer::StageSequencer;
pub use workflow::{BookingOutcome, BookingRequest, BookingWorkflow};
