use uuid::Uuid;

/// Emitted after every workflow run (initial or resumed), whether or not all legs ticketed.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingSettledEvent {
    pub workflow_id: Uuid,
    pub trip_shape: String,
    pub status: String,
    pub booking_references: Vec<String>,
    pub booking_ids: Vec<String>,
    pub failed_leg: Option<LegFailureSummary>,
    pub total_minor: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct LegFailureSummary {
    pub leg_index: usize,
    pub stage: String,
    pub error_kind: String,
    pub message: String,
}

/// Emitted when an expired session was replaced by a rematched offer.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct LegRecoveredEvent {
    pub workflow_id: Uuid,
    pub leg_index: usize,
    pub stage: String,
    pub score: i64,
    pub timestamp: i64,
}
