//! Capacity rollover: when a trip saturates, the next departure on the same
//! route is opened for booking.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use transit_core::{BookingTx, RolloverPolicy, Trip, TripStatus};
use transit_shared::{RebalanceReason, RebalanceRequested};

use crate::error::BookingError;
use crate::notices::Outbox;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saturation {
    /// Nothing changed.
    Open,
    /// A fully booked trip dropped below capacity and is bookable again.
    Reopened,
    /// The trip just became fully booked. `successor` is the trip now
    /// carrying the overflow, if there is one.
    Saturated { successor: Option<Uuid> },
}

/// Re-derives the trip's booking status from its confirmed ticket count and
/// applies the rollover rule when it saturates.
pub async fn evaluate_saturation(
    tx: &mut dyn BookingTx,
    trip_id: Uuid,
    policy: RolloverPolicy,
    outbox: &mut Outbox,
) -> Result<Saturation, BookingError> {
    let mut trip = tx.get_trip(trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
    let bus = tx.get_bus(trip.bus_id).await?.ok_or(BookingError::NotFound("Bus"))?;
    let confirmed = tx.count_confirmed_tickets(trip.id).await?;
    let capacity = i64::from(bus.capacity);

    if confirmed >= capacity && trip.status.is_pre_departure() {
        set_status(tx, &mut trip, TripStatus::FullyBooked).await?;
        info!(trip_code = %trip.trip_code, confirmed, capacity, "Trip fully booked");

        let successor = open_successor(tx, &trip).await?;
        if successor.is_none() {
            match policy {
                RolloverPolicy::Strict => return Err(BookingError::NoAvailableSuccessor(trip.trip_code)),
                RolloverPolicy::Signal => {
                    warn!(
                        trip_code = %trip.trip_code,
                        route_id = %trip.route_id,
                        "No later trip on the route to roll over into; requesting rebalance"
                    );
                    outbox.rebalance(RebalanceRequested::new(
                        trip.route_id,
                        Some(trip.id),
                        RebalanceReason::SaturatedWithoutSuccessor,
                    ));
                }
            }
        }
        return Ok(Saturation::Saturated { successor });
    }

    if confirmed < capacity && trip.status == TripStatus::FullyBooked {
        set_status(tx, &mut trip, TripStatus::Available).await?;
        info!(trip_code = %trip.trip_code, confirmed, capacity, "Trip reopened for booking");
        return Ok(Saturation::Reopened);
    }

    Ok(Saturation::Open)
}

/// For every fully booked trip on the route with no open departure after it,
/// promote the next scheduled one. Returns the trips that were promoted. Safe
/// to run repeatedly.
pub async fn rebalance_route(tx: &mut dyn BookingTx, route_id: Uuid) -> Result<Vec<Uuid>, BookingError> {
    let mut trips = tx.list_trips_for_route(route_id, None, None).await?;
    trips.sort_by_key(|t| t.embark_time);
    let mut promoted = Vec::new();

    for i in 0..trips.len() {
        if trips[i].status != TripStatus::FullyBooked {
            continue;
        }
        if trips[i + 1..].iter().any(|t| t.status == TripStatus::Available) {
            continue;
        }
        if let Some(id) = open_successor(tx, &trips[i]).await? {
            if let Some(t) = trips.iter_mut().find(|t| t.id == id) {
                t.status = TripStatus::Available;
            }
            promoted.push(id);
        }
    }
    Ok(promoted)
}

/// Promotes the earliest later `scheduled` trip on the route. Trips that are
/// already available do not count.
async fn open_successor(tx: &mut dyn BookingTx, trip: &Trip) -> Result<Option<Uuid>, BookingError> {
    let Some(next) = tx.next_trip_on_route(trip.route_id, trip.embark_time).await? else {
        return Ok(None);
    };
    let id = next.id;
    promote(tx, next).await?;
    Ok(Some(id))
}

async fn promote(tx: &mut dyn BookingTx, mut trip: Trip) -> Result<(), BookingError> {
    set_status(tx, &mut trip, TripStatus::Available).await?;
    info!(trip_code = %trip.trip_code, "Trip promoted to available");
    Ok(())
}

async fn set_status(tx: &mut dyn BookingTx, trip: &mut Trip, next: TripStatus) -> Result<(), BookingError> {
    trip.status = trip.status.transition(next)?;
    trip.updated_at = Utc::now();
    tx.update_trip(trip).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use transit_core::{BookingRules, BookingStore};

    #[tokio::test]
    async fn below_capacity_is_left_alone() {
        let fx = Fixture::new(3).await;
        let trip = fx.trip_in(24, TripStatus::Scheduled).await;
        let mut tx = fx.store.begin().await.unwrap();
        let mut outbox = Outbox::new();

        let outcome = evaluate_saturation(&mut *tx, trip.id, RolloverPolicy::Strict, &mut outbox)
            .await
            .unwrap();
        assert_eq!(outcome, Saturation::Open);
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn available_later_trip_is_not_a_successor() {
        let fx = Fixture::new(1).await;
        let full = fx.trip_in(24, TripStatus::Available).await;
        let open = fx.trip_in(48, TripStatus::Available).await;
        let scheduled = fx.trip_in(72, TripStatus::Scheduled).await;
        fx.tickets(Default::default())
            .create_walk_in(fx.walk_in(full.id, "ST01"))
            .await
            .unwrap();

        assert_eq!(fx.store.trip(full.id).await.unwrap().status, TripStatus::FullyBooked);
        assert_eq!(fx.store.trip(open.id).await.unwrap().status, TripStatus::Available);
        assert_eq!(fx.store.trip(scheduled.id).await.unwrap().status, TripStatus::Available);
    }

    #[tokio::test]
    async fn strict_policy_fails_when_only_available_trips_follow() {
        let fx = Fixture::new(1).await;
        let full = fx.trip_in(24, TripStatus::Available).await;
        let open = fx.trip_in(48, TripStatus::Available).await;
        let strict = BookingRules { rollover_policy: RolloverPolicy::Strict, ..Default::default() };

        let err = fx
            .tickets(strict)
            .create_walk_in(fx.walk_in(full.id, "ST01"))
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::NoAvailableSuccessor(_)));
        assert_eq!(fx.store.trip(full.id).await.unwrap().status, TripStatus::Available);
        assert_eq!(fx.store.trip(open.id).await.unwrap().status, TripStatus::Available);
    }

    #[tokio::test]
    async fn rebalance_promotes_once_per_full_trip() {
        let fx = Fixture::new(2).await;
        let full = fx.trip_in(24, TripStatus::FullyBooked).await;
        let next = fx.trip_in(48, TripStatus::Scheduled).await;
        let later = fx.trip_in(72, TripStatus::Scheduled).await;

        let mut tx = fx.store.begin().await.unwrap();
        assert_eq!(rebalance_route(&mut *tx, fx.route.id).await.unwrap(), vec![next.id]);
        assert!(rebalance_route(&mut *tx, fx.route.id).await.unwrap().is_empty());
        tx.commit().await.unwrap();

        assert_eq!(fx.store.trip(full.id).await.unwrap().status, TripStatus::FullyBooked);
        assert_eq!(fx.store.trip(later.id).await.unwrap().status, TripStatus::Scheduled);
    }

    #[tokio::test]
    async fn departed_trips_are_not_marked_fully_booked() {
        let fx = Fixture::new(2).await;
        let trip = fx.trip_in(1, TripStatus::Scheduled).await;
        let tickets = fx.tickets(Default::default());
        tickets.create_walk_in(fx.walk_in(trip.id, "ST01")).await.unwrap();
        fx.trips(Default::default())
            .update_status(trip.id, TripStatus::Embarked)
            .await
            .unwrap();

        // A late walk-in on the bus fills the last seat.
        tickets.create_walk_in(fx.walk_in(trip.id, "ST02")).await.unwrap();
        assert_eq!(fx.store.trip(trip.id).await.unwrap().status, TripStatus::Embarked);
    }

    #[tokio::test]
    async fn rebalance_skips_routes_without_full_trips() {
        let fx = Fixture::new(2).await;
        fx.trip_in(24, TripStatus::Scheduled).await;
        let mut tx = fx.store.begin().await.unwrap();
        assert!(rebalance_route(&mut *tx, fx.route.id).await.unwrap().is_empty());
    }
}
