use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use transit_core::{
    BookingStore, BookingTx, Bus, Driver, DriverStatus, Notifier, NotifyError, PointsEntry,
    Route, Seat, SeatState, Stop, StoreResult, Ticket, TicketDetails, TicketFilter,
    TicketStatus, TicketSummary, Trip, TripStatus, User, UserRole,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    buses: HashMap<Uuid, Bus>,
    drivers: HashMap<Uuid, Driver>,
    routes: HashMap<Uuid, Route>,
    stops: HashMap<Uuid, Stop>,
    users: HashMap<Uuid, User>,
    trips: HashMap<Uuid, Trip>,
    seats: BTreeMap<(Uuid, String), SeatState>,
    tickets: HashMap<Uuid, Ticket>,
    points: Vec<PointsEntry>,
    counters: HashMap<String, u32>,
}

/// In-process store. Transactions take the single lock for their whole
/// lifetime and work on a copy that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_bus(&self, bus: Bus) {
        self.state.lock().await.buses.insert(bus.id, bus);
    }

    pub async fn insert_driver(&self, driver: Driver) {
        self.state.lock().await.drivers.insert(driver.id, driver);
    }

    pub async fn insert_route(&self, route: Route) {
        self.state.lock().await.routes.insert(route.id, route);
    }

    pub async fn insert_stop(&self, stop: Stop) {
        self.state.lock().await.stops.insert(stop.id, stop);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn trip(&self, id: Uuid) -> Option<Trip> {
        self.state.lock().await.trips.get(&id).cloned()
    }

    pub async fn ticket(&self, id: Uuid) -> Option<Ticket> {
        self.state.lock().await.tickets.get(&id).cloned()
    }

    pub async fn user(&self, id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&id).cloned()
    }

    pub async fn driver(&self, id: Uuid) -> Option<Driver> {
        self.state.lock().await.drivers.get(&id).cloned()
    }

    pub async fn seat_state(&self, trip_id: Uuid, seat_number: &str) -> Option<SeatState> {
        self.state
            .lock()
            .await
            .seats
            .get(&(trip_id, seat_number.to_string()))
            .copied()
    }

    pub async fn seats(&self, trip_id: Uuid) -> Vec<Seat> {
        self.state.lock().await.seats_for(trip_id)
    }

    pub async fn points_entries(&self, user_id: Uuid) -> Vec<PointsEntry> {
        self.state
            .lock()
            .await
            .points
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl MemoryState {
    fn seats_for(&self, trip_id: Uuid) -> Vec<Seat> {
        self.seats
            .iter()
            .filter(|((t, _), _)| *t == trip_id)
            .map(|((t, label), state)| Seat { trip_id: *t, seat_number: label.clone(), state: *state })
            .collect()
    }

    fn summarize(&self, ticket: &Ticket) -> Option<TicketSummary> {
        let trip = self.trips.get(&ticket.trip_id)?;
        let route = self.routes.get(&trip.route_id)?;
        let bus = self.buses.get(&trip.bus_id)?;
        let user = self.users.get(&ticket.user_id)?;
        Some(TicketSummary {
            ticket: ticket.clone(),
            trip_code: trip.trip_code.clone(),
            origin: route.origin.clone(),
            destination: route.destination.clone(),
            bus_number: bus.bus_number.clone(),
            passenger_name: user.name.clone(),
            passenger_email: user.email.clone(),
        })
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl BookingTx for MemoryTx {
    async fn get_bus(&mut self, id: Uuid) -> StoreResult<Option<Bus>> {
        Ok(self.working.buses.get(&id).cloned())
    }

    async fn get_driver(&mut self, id: Uuid) -> StoreResult<Option<Driver>> {
        Ok(self.working.drivers.get(&id).cloned())
    }

    async fn get_route(&mut self, id: Uuid) -> StoreResult<Option<Route>> {
        Ok(self.working.routes.get(&id).cloned())
    }

    async fn get_stop(&mut self, id: Uuid) -> StoreResult<Option<Stop>> {
        Ok(self.working.stops.get(&id).cloned())
    }

    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn list_users_by_role(&mut self, roles: &[UserRole]) -> StoreResult<Vec<User>> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| roles.contains(&u.role))
            .cloned()
            .collect())
    }

    async fn list_expired_licenses(&mut self, today: NaiveDate) -> StoreResult<Vec<Driver>> {
        Ok(self
            .working
            .drivers
            .values()
            .filter(|d| d.status != DriverStatus::Suspended)
            .filter(|d| d.license_expiry.map(|exp| exp < today).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn set_driver_status(&mut self, id: Uuid, status: DriverStatus) -> StoreResult<()> {
        if let Some(driver) = self.working.drivers.get_mut(&id) {
            driver.status = status;
        }
        Ok(())
    }

    async fn next_trip_sequence(&mut self, counter_key: &str) -> StoreResult<u32> {
        let counter = self.working.counters.entry(counter_key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn find_conflicting_trip(
        &mut self,
        bus_id: Uuid,
        driver_id: Uuid,
        embark_time: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> StoreResult<Option<Uuid>> {
        Ok(self
            .working
            .trips
            .values()
            .filter(|t| Some(t.id) != exclude)
            .find(|t| t.bus_id == bus_id && t.driver_id == driver_id && t.embark_time == embark_time)
            .map(|t| t.id))
    }

    async fn insert_trip(&mut self, trip: &Trip) -> StoreResult<()> {
        if self.working.trips.values().any(|t| t.trip_code == trip.trip_code) {
            return Err(format!("duplicate trip code {}", trip.trip_code).into());
        }
        self.working.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self.working.trips.get(&id).cloned())
    }

    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        // The transaction already holds the store-wide lock.
        self.get_trip(id).await
    }

    async fn update_trip(&mut self, trip: &Trip) -> StoreResult<()> {
        self.working.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn delete_trip(&mut self, id: Uuid) -> StoreResult<()> {
        if self.working.tickets.values().any(|t| t.trip_id == id) {
            return Err("trip is still referenced by tickets".into());
        }
        self.working.trips.remove(&id);
        Ok(())
    }

    async fn next_trip_on_route(
        &mut self,
        route_id: Uuid,
        after: DateTime<Utc>,
    ) -> StoreResult<Option<Trip>> {
        Ok(self
            .working
            .trips
            .values()
            .filter(|t| t.route_id == route_id && t.embark_time > after)
            .filter(|t| t.status == TripStatus::Scheduled)
            .min_by_key(|t| t.embark_time)
            .cloned())
    }

    async fn list_trips_for_route(
        &mut self,
        route_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Trip>> {
        let mut trips: Vec<Trip> = self
            .working
            .trips
            .values()
            .filter(|t| t.route_id == route_id)
            .filter(|t| from.map(|f| t.embark_time >= f).unwrap_or(true))
            .filter(|t| to.map(|e| t.embark_time <= e).unwrap_or(true))
            .cloned()
            .collect();
        trips.sort_by(|a, b| b.embark_time.cmp(&a.embark_time));
        Ok(trips)
    }

    async fn count_trips_for_bus(&mut self, bus_id: Uuid) -> StoreResult<i64> {
        Ok(self.working.trips.values().filter(|t| t.bus_id == bus_id).count() as i64)
    }

    async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
        for seat in seats {
            let key = (seat.trip_id, seat.seat_number.clone());
            if self.working.seats.contains_key(&key) {
                return Err(format!("duplicate seat {} on trip {}", seat.seat_number, seat.trip_id).into());
            }
            self.working.seats.insert(key, seat.state);
        }
        Ok(())
    }

    async fn reserve_seat(&mut self, trip_id: Uuid, seat_number: &str) -> StoreResult<bool> {
        match self.working.seats.get_mut(&(trip_id, seat_number.to_string())) {
            Some(state) if *state == SeatState::Available => {
                *state = SeatState::Reserved;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_seat(&mut self, trip_id: Uuid, seat_number: &str) -> StoreResult<bool> {
        match self.working.seats.get_mut(&(trip_id, seat_number.to_string())) {
            Some(state) => {
                *state = SeatState::Available;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_seats(&mut self, trip_id: Uuid, seat_numbers: &[String]) -> StoreResult<u64> {
        let mut released = 0;
        for label in seat_numbers {
            if self.release_seat(trip_id, label).await? {
                released += 1;
            }
        }
        Ok(released)
    }

    async fn delete_seats(&mut self, trip_id: Uuid) -> StoreResult<u64> {
        let before = self.working.seats.len();
        self.working.seats.retain(|(t, _), _| *t != trip_id);
        Ok((before - self.working.seats.len()) as u64)
    }

    async fn list_seats(&mut self, trip_id: Uuid) -> StoreResult<Vec<Seat>> {
        Ok(self.working.seats_for(trip_id))
    }

    async fn ticket_number_exists(&mut self, ticket_number: &str) -> StoreResult<bool> {
        Ok(self.working.tickets.values().any(|t| t.ticket_number == ticket_number))
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        if self.ticket_number_exists(&ticket.ticket_number).await? {
            return Err(format!("duplicate ticket number {}", ticket.ticket_number).into());
        }
        self.working.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.working.tickets.get(&id).cloned())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        self.working.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<()> {
        self.working.tickets.remove(&id);
        Ok(())
    }

    async fn count_confirmed_tickets(&mut self, trip_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .working
            .tickets
            .values()
            .filter(|t| t.trip_id == trip_id && t.status == TicketStatus::Confirmed)
            .count() as i64)
    }

    async fn list_trip_tickets(&mut self, trip_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .working
            .tickets
            .values()
            .filter(|t| t.trip_id == trip_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    async fn list_confirmed_at_stop(&mut self, trip_id: Uuid, stop_id: Uuid) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .working
            .tickets
            .values()
            .filter(|t| t.trip_id == trip_id && t.stop_id == Some(stop_id))
            .filter(|t| t.status == TicketStatus::Confirmed)
            .cloned()
            .collect())
    }

    async fn search_tickets(&mut self, filter: &TicketFilter) -> StoreResult<Vec<TicketSummary>> {
        let mut summaries: Vec<TicketSummary> = self
            .working
            .tickets
            .values()
            .filter_map(|t| self.working.summarize(t))
            .filter(|s| filter.matches(s))
            .collect();
        summaries.sort_by(|a, b| b.ticket.created_at.cmp(&a.ticket.created_at));
        Ok(summaries)
    }

    async fn passenger_phones(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut phones = Vec::new();
        for ticket in self.working.tickets.values().filter(|t| t.trip_id == trip_id) {
            let phone = self
                .working
                .users
                .get(&ticket.user_id)
                .and_then(|u| u.phone.clone());
            if let Some(phone) = phone {
                if seen.insert(phone.clone()) {
                    phones.push(phone);
                }
            }
        }
        Ok(phones)
    }

    async fn add_user_points(&mut self, user_id: Uuid, points: i64) -> StoreResult<Option<i64>> {
        Ok(self.working.users.get_mut(&user_id).map(|user| {
            user.total_points += points;
            user.total_points
        }))
    }

    async fn insert_points_entry(&mut self, entry: &PointsEntry) -> StoreResult<()> {
        self.working.points.push(entry.clone());
        Ok(())
    }

    async fn list_points_entries(&mut self, user_id: Uuid) -> StoreResult<Vec<PointsEntry>> {
        let mut entries: Vec<PointsEntry> = self
            .working
            .points
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

/// Something a [`RecordingNotifier`] was asked to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Notification { user_id: Uuid, subject: String, message: String },
    Email { address: String, details: TicketDetails },
    Sms { to: String, body: String },
    BulkSms { recipients: Vec<String>, body: String },
}

/// Notifier that keeps every delivery in memory. Can be told to fail so that
/// callers' best-effort handling can be exercised.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    deliveries: Arc<std::sync::Mutex<Vec<Delivery>>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Waits up to five seconds for background deliveries to satisfy `done`,
    /// then returns whatever has been recorded.
    pub async fn wait_for(&self, done: impl Fn(&[Delivery]) -> bool) -> Vec<Delivery> {
        let settled = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !done(&self.deliveries()) {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        if settled.is_err() {
            tracing::warn!("Gave up waiting for notifier deliveries");
        }
        self.deliveries()
    }

    fn record(&self, delivery: Delivery) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Delivery("recording notifier set to fail".to_string()));
        }
        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.push(delivery);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: Uuid, subject: &str, message: &str) -> Result<(), NotifyError> {
        self.record(Delivery::Notification {
            user_id,
            subject: subject.to_string(),
            message: message.to_string(),
        })
    }

    async fn send_ticket_email(&self, address: &str, details: &TicketDetails) -> Result<(), NotifyError> {
        self.record(Delivery::Email { address: address.to_string(), details: details.clone() })
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        self.record(Delivery::Sms { to: to.to_string(), body: body.to_string() })
    }

    async fn send_bulk_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifyError> {
        self.record(Delivery::BulkSms { recipients: recipients.to_vec(), body: body.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(trip_id: Uuid, label: &str) -> Seat {
        Seat { trip_id, seat_number: label.to_string(), state: SeatState::Available }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_state_untouched() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_seats(&[seat(trip_id, "ST01")]).await.unwrap();
        drop(tx);

        assert!(store.seats(trip_id).await.is_empty());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_seats(&[seat(trip_id, "ST01"), seat(trip_id, "ST02")]).await.unwrap();
        assert!(tx.reserve_seat(trip_id, "ST01").await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.seat_state(trip_id, "ST01").await, Some(SeatState::Reserved));
        assert_eq!(store.seat_state(trip_id, "ST02").await, Some(SeatState::Available));
    }

    #[tokio::test]
    async fn reserve_is_conditional() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_seats(&[seat(trip_id, "ST01")]).await.unwrap();
        assert!(tx.reserve_seat(trip_id, "ST01").await.unwrap());
        assert!(!tx.reserve_seat(trip_id, "ST01").await.unwrap());
        assert!(!tx.reserve_seat(trip_id, "ST99").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_seat_labels_are_rejected() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_seats(&[seat(trip_id, "ST01"), seat(trip_id, "ST01")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn trip_sequence_counts_per_key() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.next_trip_sequence("global").await.unwrap(), 1);
        assert_eq!(tx.next_trip_sequence("global").await.unwrap(), 2);
        assert_eq!(tx.next_trip_sequence("20260101").await.unwrap(), 1);
    }
}
