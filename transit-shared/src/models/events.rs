use uuid::Uuid;

/// Raised when a route may need a trip promoted to `available`: a trip on it
/// saturated without a successor, or a new trip was scheduled on it.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct RebalanceRequested {
    pub route_id: Uuid,
    pub trigger_trip_id: Option<Uuid>,
    pub reason: RebalanceReason,
    pub requested_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceReason {
    SaturatedWithoutSuccessor,
    TripScheduled,
}

impl RebalanceRequested {
    pub fn new(route_id: Uuid, trigger_trip_id: Option<Uuid>, reason: RebalanceReason) -> Self {
        Self {
            route_id,
            trigger_trip_id,
            reason,
            requested_at: chrono::Utc::now().timestamp(),
        }
    }
}
