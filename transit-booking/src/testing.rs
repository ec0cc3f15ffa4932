use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use transit_core::{
    BookingRules, BookingStore, Bus, Driver, DriverStatus, Notifier, Route, Stop, Trip,
    TripStatus, User, UserRole,
};
use transit_store::memory::{MemoryStore, RecordingNotifier};

use crate::seats;
use crate::signal::RebalanceSignal;
use crate::tickets::{TicketService, WalkInTicket};
use crate::trips::TripService;

/// A route with one bus, one driver, one stop and a customer, in memory.
pub struct Fixture {
    pub store: MemoryStore,
    pub notifier: RecordingNotifier,
    pub bus: Bus,
    pub driver: Driver,
    pub route: Route,
    pub stop: Stop,
    pub customer: User,
}

impl Fixture {
    pub async fn new(capacity: i32) -> Self {
        Self::with_distance(capacity, Some(250.0)).await
    }

    pub async fn with_distance(capacity: i32, distance: Option<f64>) -> Self {
        let store = MemoryStore::new();
        let customer = user("Kwame Asante", UserRole::Customer, Some("+233241112223"));
        let driver_user = user("Yaw Boateng", UserRole::Driver, None);
        let bus = bus(capacity);
        let route = Route {
            id: Uuid::new_v4(),
            origin: "Accra".to_string(),
            destination: "Kumasi".to_string(),
            distance,
            duration: Some(4.5),
        };
        let stop = Stop {
            id: Uuid::new_v4(),
            route_id: route.id,
            stop_name: "Nkawkaw".to_string(),
            price: 85.0,
        };
        let driver = Driver {
            id: Uuid::new_v4(),
            user_id: driver_user.id,
            driver_no: Some("DRV-7".to_string()),
            license_number: "GH-LIC-0007".to_string(),
            license_expiry: NaiveDate::from_ymd_opt(2099, 1, 1),
            status: DriverStatus::Active,
        };

        store.insert_user(customer.clone()).await;
        store.insert_user(driver_user).await;
        store.insert_bus(bus.clone()).await;
        store.insert_route(route.clone()).await;
        store.insert_stop(stop.clone()).await;
        store.insert_driver(driver.clone()).await;

        Self { store, notifier: RecordingNotifier::new(), bus, driver, route, stop, customer }
    }

    pub fn store(&self) -> Arc<dyn BookingStore> {
        Arc::new(self.store.clone())
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::new(self.notifier.clone())
    }

    pub fn tickets(&self, rules: BookingRules) -> TicketService {
        TicketService::new(self.store(), self.notifier(), rules, RebalanceSignal::disabled())
    }

    pub fn trips(&self, rules: BookingRules) -> TripService {
        TripService::new(self.store(), self.notifier(), rules, RebalanceSignal::disabled())
    }

    pub async fn add_user(&self, name: &str, role: UserRole, phone: Option<&str>) -> User {
        let user = user(name, role, phone);
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn add_bus(&self, capacity: i32) -> Bus {
        let bus = bus(capacity);
        self.store.insert_bus(bus.clone()).await;
        bus
    }

    /// Inserts a trip on the fixture route departing `hours` from now, with a
    /// fresh seat ledger.
    pub async fn trip_in(&self, hours: i64, status: TripStatus) -> Trip {
        let now = Utc::now();
        let trip = Trip {
            id: Uuid::new_v4(),
            trip_code: format!("TRIP-TEST-{}", Uuid::new_v4().simple()),
            bus_id: self.bus.id,
            driver_id: self.driver.id,
            route_id: self.route.id,
            embark_time: now + Duration::hours(hours),
            arrival_time: None,
            status,
            is_scheduled: true,
            created_at: now,
            updated_at: now,
        };
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_trip(&trip).await.unwrap();
        seats::create_seats(&mut *tx, trip.id, self.bus.capacity).await.unwrap();
        tx.commit().await.unwrap();
        trip
    }

    pub fn walk_in(&self, trip_id: Uuid, seat: &str) -> WalkInTicket {
        WalkInTicket {
            user_id: self.customer.id,
            trip_id,
            seat_number: seat.to_string(),
            stop_id: Some(self.stop.id),
            recipient_name: None,
            recipient_relationship: None,
            is_paid: false,
            is_confirmed: true,
            served_by: Some("Front desk".to_string()),
        }
    }
}

fn user(name: &str, role: UserRole, phone: Option<&str>) -> User {
    let slug = name.to_lowercase().replace(' ', ".");
    User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: Some(format!("{slug}@example.com")),
        phone: phone.map(String::from),
        role,
        total_points: 0,
    }
}

fn bus(capacity: i32) -> Bus {
    Bus {
        id: Uuid::new_v4(),
        name: "Express".to_string(),
        model: "Yutong ZK6122".to_string(),
        bus_number: format!("GT-{}", &Uuid::new_v4().simple().to_string()[..4]),
        capacity,
    }
}
