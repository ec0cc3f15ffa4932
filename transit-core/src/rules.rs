use serde::{Deserialize, Serialize};

use crate::trip_code::SequenceScope;

/// What happens when a trip fills up and no later trip on the route can take
/// the overflow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RolloverPolicy {
    /// Keep the booking, log a warning and ask the rebalance worker to retry.
    #[default]
    Signal,
    /// Refuse the booking that saturated the trip.
    Strict,
}

/// Tunables for the booking services, read from `business_rules`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BookingRules {
    pub rollover_policy: RolloverPolicy,
    pub trip_code_scope: SequenceScope,
    pub ticket_prefix: String,
    /// Kilometres per loyalty point.
    pub points_distance_divisor: f64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            rollover_policy: RolloverPolicy::Signal,
            trip_code_scope: SequenceScope::Global,
            ticket_prefix: "TKT".to_string(),
            points_distance_divisor: 25.0,
        }
    }
}
