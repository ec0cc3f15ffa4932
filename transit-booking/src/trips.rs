use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use transit_core::{
    BookingRules, BookingStore, BookingTx, Notifier, Seat, TicketStatus, Trip, TripCode,
    TripStatus,
};
use transit_shared::{RebalanceReason, RebalanceRequested};

use crate::error::BookingError;
use crate::notices::{trip_status_sms, Outbox};
use crate::rollover;
use crate::seats;
use crate::signal::RebalanceSignal;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub bus_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
    pub embark_time: DateTime<Utc>,
    #[serde(default = "default_scheduled")]
    pub is_scheduled: bool,
    /// `scheduled` (default) or `available`.
    pub status: Option<String>,
}

fn default_scheduled() -> bool {
    true
}

/// Operator edit of a trip. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripChanges {
    pub bus_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub embark_time: Option<DateTime<Utc>>,
    pub status: Option<TripStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripDetails {
    #[serde(flatten)]
    pub trip: Trip,
    pub seats: Vec<Seat>,
    pub ticket_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatsReleased {
    pub trip_id: Uuid,
    pub stop_id: Uuid,
    pub released: Vec<String>,
    pub status: TripStatus,
}

pub struct TripService {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    rules: BookingRules,
    signal: RebalanceSignal,
}

impl TripService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        rules: BookingRules,
        signal: RebalanceSignal,
    ) -> Self {
        Self { store, notifier, rules, signal }
    }

    pub async fn create_trip(&self, req: NewTrip) -> Result<Trip, BookingError> {
        let status = initial_status(req.status.as_deref())?;

        let mut tx = self.store.begin().await?;
        let bus = tx.get_bus(req.bus_id).await?.ok_or(BookingError::NotFound("Bus"))?;
        tx.get_route(req.route_id).await?.ok_or(BookingError::NotFound("Route"))?;
        tx.get_driver(req.driver_id).await?.ok_or(BookingError::NotFound("Driver"))?;
        if bus.capacity <= 0 {
            return Err(BookingError::validation(format!("Bus {} has no seats", bus.bus_number)));
        }
        if tx.find_conflicting_trip(bus.id, req.driver_id, req.embark_time, None).await?.is_some() {
            return Err(BookingError::SchedulingConflict);
        }

        let now = Utc::now();
        let today = now.date_naive();
        let sequence = tx.next_trip_sequence(&self.rules.trip_code_scope.counter_key(today)).await?;
        let trip = Trip {
            id: Uuid::new_v4(),
            trip_code: TripCode::new(today, sequence).to_string(),
            bus_id: bus.id,
            driver_id: req.driver_id,
            route_id: req.route_id,
            embark_time: req.embark_time,
            arrival_time: None,
            status,
            is_scheduled: req.is_scheduled,
            created_at: now,
            updated_at: now,
        };
        tx.insert_trip(&trip).await?;
        seats::create_seats(&mut *tx, trip.id, bus.capacity).await?;
        tx.commit().await?;

        info!(trip_code = %trip.trip_code, bus = %bus.bus_number, embark_time = %trip.embark_time, "Trip created");
        self.signal.raise(RebalanceRequested::new(trip.route_id, Some(trip.id), RebalanceReason::TripScheduled));
        Ok(trip)
    }

    pub async fn get_trip(&self, trip_id: Uuid) -> Result<TripDetails, BookingError> {
        let mut tx = self.store.begin().await?;
        let trip = tx.get_trip(trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        let seats = tx.list_seats(trip.id).await?;
        let ticket_count = tx.list_trip_tickets(trip.id).await?.len();
        Ok(TripDetails { trip, seats, ticket_count })
    }

    /// Trips on the route, latest departure first, optionally bounded by
    /// departure time.
    pub async fn list_for_route(
        &self,
        route_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trip>, BookingError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(BookingError::validation("start_date must not be after end_date"));
            }
        }
        let mut tx = self.store.begin().await?;
        tx.get_route(route_id).await?.ok_or(BookingError::NotFound("Route"))?;
        Ok(tx.list_trips_for_route(route_id, from, to).await?)
    }

    pub async fn update_trip(&self, trip_id: Uuid, changes: TripChanges) -> Result<Trip, BookingError> {
        let mut tx = self.store.begin().await?;
        let mut trip = tx.lock_trip(trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;

        if let Some(driver_id) = changes.driver_id {
            tx.get_driver(driver_id).await?.ok_or(BookingError::NotFound("Driver"))?;
            trip.driver_id = driver_id;
        }
        if let Some(route_id) = changes.route_id {
            tx.get_route(route_id).await?.ok_or(BookingError::NotFound("Route"))?;
            trip.route_id = route_id;
        }
        if let Some(embark_time) = changes.embark_time {
            trip.embark_time = embark_time;
        }
        let reassigned = match changes.bus_id.filter(|id| *id != trip.bus_id) {
            Some(bus_id) => {
                reassign(&mut *tx, &mut trip, bus_id).await?;
                true
            }
            None => false,
        };
        if tx
            .find_conflicting_trip(trip.bus_id, trip.driver_id, trip.embark_time, Some(trip.id))
            .await?
            .is_some()
        {
            return Err(BookingError::SchedulingConflict);
        }

        let mut outbox = Outbox::new();
        if let Some(status) = changes.status {
            apply_status(&mut *tx, &mut trip, status, &mut outbox).await?;
        }
        trip.updated_at = Utc::now();
        tx.update_trip(&trip).await?;
        if reassigned {
            // Capacity changed, so the booking status may have too.
            rollover::evaluate_saturation(&mut *tx, trip.id, self.rules.rollover_policy, &mut outbox).await?;
            trip = tx.get_trip(trip.id).await?.ok_or(BookingError::NotFound("Trip"))?;
        }
        tx.commit().await?;

        info!(trip_code = %trip.trip_code, status = %trip.status, "Trip updated");
        outbox.dispatch(self.notifier.clone(), &self.signal);
        Ok(trip)
    }

    pub async fn reassign_bus(&self, trip_id: Uuid, bus_id: Uuid) -> Result<Trip, BookingError> {
        self.update_trip(trip_id, TripChanges { bus_id: Some(bus_id), ..Default::default() }).await
    }

    pub async fn update_status(&self, trip_id: Uuid, status: TripStatus) -> Result<Trip, BookingError> {
        self.update_trip(trip_id, TripChanges { status: Some(status), ..Default::default() }).await
    }

    /// Frees the seats of everyone alighting at `stop_id` once the bus is on
    /// the road. All or nothing.
    pub async fn release_seats_at_stop(&self, trip_id: Uuid, stop_id: Uuid) -> Result<SeatsReleased, BookingError> {
        let mut tx = self.store.begin().await?;
        let mut trip = tx.lock_trip(trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        tx.get_stop(stop_id).await?.ok_or(BookingError::NotFound("Stop"))?;

        let alighting = tx.list_confirmed_at_stop(trip.id, stop_id).await?;
        if alighting.is_empty() {
            return Err(BookingError::NoPassengersAtStop);
        }
        let labels: Vec<String> = alighting.iter().filter_map(|t| t.seat_number.clone()).collect();
        let released = tx.release_seats(trip.id, &labels).await?;

        trip.status = trip.status.transition(TripStatus::EmbarkedNotToCapacity)?;
        trip.updated_at = Utc::now();
        tx.update_trip(&trip).await?;
        tx.commit().await?;

        info!(trip_code = %trip.trip_code, %stop_id, passengers = alighting.len(), released, "Seats released at stop");
        Ok(SeatsReleased { trip_id: trip.id, stop_id, released: labels, status: trip.status })
    }

    /// Removes a trip nobody has booked yet, together with its seat ledger.
    pub async fn delete_trip(&self, trip_id: Uuid) -> Result<(), BookingError> {
        let mut tx = self.store.begin().await?;
        let trip = tx.lock_trip(trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        let tickets = tx.list_trip_tickets(trip.id).await?;
        if !tickets.is_empty() {
            return Err(BookingError::validation(format!(
                "Trip {} has {} tickets and cannot be deleted",
                trip.trip_code,
                tickets.len()
            )));
        }
        tx.delete_seats(trip.id).await?;
        tx.delete_trip(trip.id).await?;
        tx.commit().await?;

        info!(trip_code = %trip.trip_code, "Trip deleted");
        Ok(())
    }

    /// Opens the successor of every fully booked trip on the route.
    pub async fn rebalance_route(&self, route_id: Uuid) -> Result<Vec<Uuid>, BookingError> {
        let mut tx = self.store.begin().await?;
        tx.get_route(route_id).await?.ok_or(BookingError::NotFound("Route"))?;
        let promoted = rollover::rebalance_route(&mut *tx, route_id).await?;
        tx.commit().await?;

        if !promoted.is_empty() {
            info!(%route_id, promoted = promoted.len(), "Route rebalanced");
        }
        Ok(promoted)
    }
}

fn initial_status(requested: Option<&str>) -> Result<TripStatus, BookingError> {
    let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(TripStatus::Scheduled);
    };
    match raw.parse::<TripStatus>() {
        Ok(status) if status.is_pre_departure() => Ok(status),
        _ => Err(BookingError::validation(format!(
            "Invalid trip status '{}': a new trip must be scheduled or available",
            raw
        ))),
    }
}

async fn reassign(tx: &mut dyn BookingTx, trip: &mut Trip, bus_id: Uuid) -> Result<(), BookingError> {
    let bus = tx.get_bus(bus_id).await?.ok_or(BookingError::NotFound("Bus"))?;
    let assigned = tx.count_trips_for_bus(bus.id).await?;
    if assigned >= i64::from(bus.capacity) {
        return Err(BookingError::BusCapacityExceeded {
            bus_number: bus.bus_number,
            assigned,
            capacity: bus.capacity,
        });
    }

    seats::recreate_for_capacity(tx, trip.id, bus.capacity).await?;
    let orphaned = tx
        .list_trip_tickets(trip.id)
        .await?
        .iter()
        .filter(|t| t.status != TicketStatus::Cancelled && t.seat_number.is_some())
        .count();
    if orphaned > 0 {
        warn!(
            trip_code = %trip.trip_code,
            bus = %bus.bus_number,
            orphaned,
            "Bus reassigned; tickets now hold seat labels with no reservation"
        );
    }
    trip.bus_id = bus.id;
    Ok(())
}

async fn apply_status(
    tx: &mut dyn BookingTx,
    trip: &mut Trip,
    next: TripStatus,
    outbox: &mut Outbox,
) -> Result<(), BookingError> {
    let previous = trip.status;
    trip.status = previous.transition(next)?;
    if previous == next {
        return Ok(());
    }

    if next == TripStatus::Completed && trip.arrival_time.is_none() {
        trip.arrival_time = Some(Utc::now());
    }
    if matches!(next, TripStatus::Embarked | TripStatus::Completed) {
        let phones = tx.passenger_phones(trip.id).await?;
        outbox.bulk_sms(phones, trip_status_sms(&trip.trip_code, next.as_str()));
    }
    Ok(())
}
