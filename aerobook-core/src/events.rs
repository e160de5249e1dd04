use aerobook_shared::models::events::{BookingSettledEvent, LegRecoveredEvent};
use async_trait::async_trait;

/// Sink for workflow events (Kafka in production).
#[async_trait]
pub trait BookingEventPublisher: Send + Sync {
    async fn booking_settled(&self, event: &BookingSettledEvent) -> Result<(), String>;

    async fn leg_recovered(&self, event: &LegRecoveredEvent) -> Result<(), String>;
}

/// Publisher that only logs, for deployments without a broker.
pub struct LogOnlyPublisher;

#[async_trait]
impl BookingEventPublisher for LogOnlyPublisher {
    async fn booking_settled(&self, event: &BookingSettledEvent) -> Result<(), String> {
        tracing::info!(
            workflow_id = %event.workflow_id,
            status = %event.status,
            "Booking settled with references {:?}",
            event.booking_references
        );
        Ok(())
    }

    async fn leg_recovered(&self, event: &LegRecoveredEvent) -> Result<(), String> {
        tracing::info!(
            workflow_id = %event.workflow_id,
            leg_index = event.leg_index,
            "Leg recovered during {} (score {})",
            event.stage,
            event.score
        );
        Ok(())
    }
}
