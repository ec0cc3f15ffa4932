use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use transit_core::{BookingStore, BookingTx, PointsEntry, PointsKind};

use crate::error::BookingError;

/// Credits loyalty points for a paid trip: one point per `divisor` kilometres,
/// rounded down. Routes without a usable distance and unknown users are
/// skipped with a warning rather than failing the payment.
pub async fn award(
    tx: &mut dyn BookingTx,
    user_id: Uuid,
    trip_id: Uuid,
    divisor: f64,
) -> Result<Option<PointsEntry>, BookingError> {
    let trip = tx.get_trip(trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
    let Some(route) = tx.get_route(trip.route_id).await? else {
        warn!(%trip_id, route_id = %trip.route_id, "Route missing; no points awarded");
        return Ok(None);
    };
    let Some(distance) = route.distance.filter(|d| d.is_finite() && *d >= 0.0) else {
        warn!(route_id = %route.id, distance = ?route.distance, "Route has no usable distance; no points awarded");
        return Ok(None);
    };
    if !(divisor.is_finite() && divisor > 0.0) {
        warn!(divisor, "Points divisor must be positive; no points awarded");
        return Ok(None);
    }

    let points = (distance / divisor).floor() as i64;
    let Some(total) = tx.add_user_points(user_id, points).await? else {
        warn!(%user_id, "User missing; no points awarded");
        return Ok(None);
    };

    let entry = PointsEntry {
        id: Uuid::new_v4(),
        user_id,
        kind: PointsKind::Award,
        points,
        description: Some(format!("Points awarded for trip of {} km", distance)),
        created_at: Utc::now(),
    };
    tx.insert_points_entry(&entry).await?;
    info!(%user_id, points, total, "Loyalty points awarded");
    Ok(Some(entry))
}

pub struct RewardsService {
    store: Arc<dyn BookingStore>,
}

impl RewardsService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Points history, newest first.
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<PointsEntry>, BookingError> {
        let mut tx = self.store.begin().await?;
        tx.get_user(user_id).await?.ok_or(BookingError::NotFound("User"))?;
        Ok(tx.list_points_entries(user_id).await?)
    }
}
