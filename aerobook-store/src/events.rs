use aerobook_core::events::BookingEventPublisher;
use aerobook_shared::models::events::{BookingSettledEvent, LegRecoveredEvent};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    settled_topic: String,
    recovery_topic: String,
}

impl EventProducer {
    pub fn new(
        brokers: &str,
        settled_topic: &str,
        recovery_topic: &str,
    ) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            settled_topic: settled_topic.to_string(),
            recovery_topic: recovery_topic.to_string(),
        })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl BookingEventPublisher for EventProducer {
    async fn booking_settled(&self, event: &BookingSettledEvent) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        self.publish(&self.settled_topic, &event.workflow_id.to_string(), &payload)
            .await
            .map_err(|e| e.to_string())
    }

    async fn leg_recovered(&self, event: &LegRecoveredEvent) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        self.publish(&self.recovery_topic, &event.workflow_id.to_string(), &payload)
            .await
            .map_err(|e| e.to_string())
    }
}
