use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Bus, Driver, DriverStatus, PointsEntry, Route, Seat, Stop, Ticket, TicketFilter,
    TicketSummary, Trip, User, UserRole,
};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to persistence. Every booking operation runs inside one
/// [`BookingTx`]; dropping it without [`BookingTx::commit`] rolls back.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTx>>;
}

/// Unit of work over trips, seats, tickets and the rewards ledger.
#[async_trait]
pub trait BookingTx: Send {
    // Reference data owned by other parts of the system.
    async fn get_bus(&mut self, id: Uuid) -> StoreResult<Option<Bus>>;
    async fn get_driver(&mut self, id: Uuid) -> StoreResult<Option<Driver>>;
    async fn get_route(&mut self, id: Uuid) -> StoreResult<Option<Route>>;
    async fn get_stop(&mut self, id: Uuid) -> StoreResult<Option<Stop>>;
    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;
    async fn list_users_by_role(&mut self, roles: &[UserRole]) -> StoreResult<Vec<User>>;

    /// Drivers whose licence expired before `today` and who are not suspended yet.
    async fn list_expired_licenses(&mut self, today: NaiveDate) -> StoreResult<Vec<Driver>>;
    async fn set_driver_status(&mut self, id: Uuid, status: DriverStatus) -> StoreResult<()>;

    /// Atomically bumps and returns the trip code counter for `counter_key`.
    async fn next_trip_sequence(&mut self, counter_key: &str) -> StoreResult<u32>;
    /// Another trip with the same bus, driver and departure, ignoring `exclude`.
    async fn find_conflicting_trip(
        &mut self,
        bus_id: Uuid,
        driver_id: Uuid,
        embark_time: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> StoreResult<Option<Uuid>>;
    async fn insert_trip(&mut self, trip: &Trip) -> StoreResult<()>;
    async fn get_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>>;
    /// Like `get_trip`, but holds the row until the transaction ends so that
    /// concurrent bookings on the same trip serialize.
    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>>;
    async fn update_trip(&mut self, trip: &Trip) -> StoreResult<()>;
    async fn delete_trip(&mut self, id: Uuid) -> StoreResult<()>;
    /// Earliest `scheduled` trip on the route departing strictly after `after`.
    async fn next_trip_on_route(
        &mut self,
        route_id: Uuid,
        after: DateTime<Utc>,
    ) -> StoreResult<Option<Trip>>;
    /// Newest departure first.
    async fn list_trips_for_route(
        &mut self,
        route_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Trip>>;
    async fn count_trips_for_bus(&mut self, bus_id: Uuid) -> StoreResult<i64>;

    async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()>;
    /// Conditional flip available → reserved. `false` when the seat is missing
    /// or already reserved.
    async fn reserve_seat(&mut self, trip_id: Uuid, seat_number: &str) -> StoreResult<bool>;
    /// `false` when no such seat exists.
    async fn release_seat(&mut self, trip_id: Uuid, seat_number: &str) -> StoreResult<bool>;
    async fn release_seats(&mut self, trip_id: Uuid, seat_numbers: &[String]) -> StoreResult<u64>;
    async fn delete_seats(&mut self, trip_id: Uuid) -> StoreResult<u64>;
    /// Ordered by seat number.
    async fn list_seats(&mut self, trip_id: Uuid) -> StoreResult<Vec<Seat>>;

    async fn ticket_number_exists(&mut self, ticket_number: &str) -> StoreResult<bool>;
    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()>;
    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()>;
    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<()>;
    async fn count_confirmed_tickets(&mut self, trip_id: Uuid) -> StoreResult<i64>;
    async fn list_trip_tickets(&mut self, trip_id: Uuid) -> StoreResult<Vec<Ticket>>;
    async fn list_confirmed_at_stop(&mut self, trip_id: Uuid, stop_id: Uuid) -> StoreResult<Vec<Ticket>>;
    /// Newest first.
    async fn search_tickets(&mut self, filter: &TicketFilter) -> StoreResult<Vec<TicketSummary>>;
    /// Distinct phone numbers of everyone holding a ticket on the trip.
    async fn passenger_phones(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>>;

    /// Adds `points` to the user's running total and returns the new total,
    /// or `None` if the user does not exist.
    async fn add_user_points(&mut self, user_id: Uuid, points: i64) -> StoreResult<Option<i64>>;
    async fn insert_points_entry(&mut self, entry: &PointsEntry) -> StoreResult<()>;
    /// Newest first.
    async fn list_points_entries(&mut self, user_id: Uuid) -> StoreResult<Vec<PointsEntry>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
