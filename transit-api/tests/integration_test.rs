use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use transit_api::{app, AppState};
use transit_booking::RebalanceSignal;
use transit_core::{
    BookingRules, Bus, Driver, DriverStatus, Route, Stop, User, UserRole,
};
use transit_store::{MemoryStore, RecordingNotifier};

struct TestApp {
    router: Router,
    bus: Bus,
    driver: Driver,
    route: Route,
    stop: Stop,
    customer: User,
}

impl TestApp {
    async fn new(capacity: i32) -> Self {
        let store = MemoryStore::new();
        let customer = User {
            id: Uuid::new_v4(),
            name: "Abena Mensah".to_string(),
            email: Some("abena@example.com".to_string()),
            phone: Some("+233209998887".to_string()),
            role: UserRole::Customer,
            total_points: 0,
        };
        let driver_user = User {
            id: Uuid::new_v4(),
            name: "Kofi Owusu".to_string(),
            email: None,
            phone: None,
            role: UserRole::Driver,
            total_points: 0,
        };
        let bus = Bus {
            id: Uuid::new_v4(),
            name: "Coastliner".to_string(),
            model: "VDL Futura".to_string(),
            bus_number: "GR-2041-24".to_string(),
            capacity,
        };
        let route = Route {
            id: Uuid::new_v4(),
            origin: "Accra".to_string(),
            destination: "Cape Coast".to_string(),
            distance: Some(150.0),
            duration: Some(3.0),
        };
        let stop = Stop {
            id: Uuid::new_v4(),
            route_id: route.id,
            stop_name: "Kasoa".to_string(),
            price: 40.0,
        };
        let driver = Driver {
            id: Uuid::new_v4(),
            user_id: driver_user.id,
            driver_no: Some("DRV-12".to_string()),
            license_number: "GH-LIC-0012".to_string(),
            license_expiry: NaiveDate::from_ymd_opt(2099, 12, 31),
            status: DriverStatus::Active,
        };

        store.insert_user(customer.clone()).await;
        store.insert_user(driver_user).await;
        store.insert_bus(bus.clone()).await;
        store.insert_route(route.clone()).await;
        store.insert_stop(stop.clone()).await;
        store.insert_driver(driver.clone()).await;

        let state = AppState::new(
            Arc::new(store),
            Arc::new(RecordingNotifier::new()),
            BookingRules::default(),
            RebalanceSignal::disabled(),
        );

        Self { router: app(state), bus, driver, route, stop, customer }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_trip(&self, hours_ahead: i64) -> Value {
        let embark_time = Utc::now() + Duration::hours(hours_ahead);
        let (status, trip) = self
            .send(
                "POST",
                "/trips",
                Some(json!({
                    "bus_id": self.bus.id,
                    "driver_id": self.driver.id,
                    "route_id": self.route.id,
                    "embark_time": embark_time,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{trip}");
        trip
    }

    async fn walk_in(&self, trip_id: &str, seat: &str, is_paid: bool) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/tickets",
            Some(json!({
                "user_id": self.customer.id,
                "trip_id": trip_id,
                "seat_number": seat,
                "stop_id": self.stop.id,
                "is_paid": is_paid,
            })),
        )
        .await
    }
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new(4).await;
    let (status, body) = app.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn trip_creation_builds_seat_ledger_and_sequential_codes() {
    let app = TestApp::new(3).await;
    let first = app.create_trip(24).await;
    let second = app.create_trip(48).await;

    let today = Utc::now().format("%Y%m%d").to_string();
    assert_eq!(first["trip_code"], format!("TRIP-{today}-0001"));
    assert_eq!(second["trip_code"], format!("TRIP-{today}-0002"));
    assert_eq!(first["status"], "scheduled");

    let (status, details) = app.send("GET", &format!("/trips/{}", id_of(&first)), None).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = details["seats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["seat_number"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["ST01", "ST02", "ST03"]);
    assert_eq!(details["ticket_count"], 0);
}

#[tokio::test]
async fn duplicate_trip_slot_is_rejected() {
    let app = TestApp::new(3).await;
    let embark_time = Utc::now() + Duration::hours(12);
    let body = json!({
        "bus_id": app.bus.id,
        "driver_id": app.driver.id,
        "route_id": app.route.id,
        "embark_time": embark_time,
    });

    let (status, _) = app.send("POST", "/trips", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, err) = app.send("POST", "/trips", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn taken_seat_is_rejected_with_message() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(24).await);

    let (status, ticket) = app.walk_in(&trip_id, "ST01", false).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["seat_number"], "ST01");
    assert_eq!(ticket["status"], "confirmed");

    let (status, err) = app.walk_in(&trip_id, "ST01", false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "Seat ST01 is not available");
}

#[tokio::test]
async fn saturating_a_trip_opens_the_next_departure() {
    let app = TestApp::new(2).await;
    let first = id_of(&app.create_trip(24).await);
    let later = id_of(&app.create_trip(48).await);

    assert_eq!(app.walk_in(&first, "ST01", false).await.0, StatusCode::CREATED);
    assert_eq!(app.walk_in(&first, "ST02", false).await.0, StatusCode::CREATED);

    let (_, first_trip) = app.send("GET", &format!("/trips/{first}"), None).await;
    let (_, later_trip) = app.send("GET", &format!("/trips/{later}"), None).await;
    assert_eq!(first_trip["status"], "fully_booked");
    assert_eq!(later_trip["status"], "available");
}

#[tokio::test]
async fn paid_walk_in_earns_points() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(24).await);
    assert_eq!(app.walk_in(&trip_id, "ST02", true).await.0, StatusCode::CREATED);

    let (status, history) = app
        .send("GET", &format!("/users/{}/points-history", app.customer.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    // 150 km / 25
    assert_eq!(entries[0]["points"], 6);
}

#[tokio::test]
async fn deleting_a_ticket_on_a_departed_trip_fails() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(1).await);
    let (_, ticket) = app.walk_in(&trip_id, "ST01", false).await;

    let (status, _) = app
        .send("PUT", &format!("/trips/{trip_id}"), Some(json!({ "status": "embarked" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = app.send("DELETE", &format!("/tickets/{}", id_of(&ticket)), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].as_str().unwrap().contains("embarked"));

    let (status, _) = app.send("GET", &format!("/tickets/{}", id_of(&ticket)), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn illegal_status_change_is_a_bad_request() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(24).await);

    let (status, _) = app
        .send("PUT", &format!("/trips/{trip_id}"), Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn releasing_seats_at_an_empty_stop_is_not_found() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(24).await);

    let (status, err) = app
        .send(
            "PUT",
            &format!("/tickets/trips/{trip_id}/stops/{}/update-seats", app.stop.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["message"], "No confirmed passengers alight at this stop");
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let app = TestApp::new(3).await;
    let (status, err) = app.send("GET", &format!("/tickets/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["message"], "Ticket not found");
}

#[tokio::test]
async fn user_listing_searches_by_destination() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(24).await);
    app.walk_in(&trip_id, "ST03", false).await;

    let uri = format!("/tickets/user/{}?search=cape", app.customer.id);
    let (status, hits) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["destination"], "Cape Coast");

    let uri = format!("/tickets/user/{}?search=kumasi", app.customer.id);
    let (_, misses) = app.send("GET", &uri, None).await;
    assert!(misses.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn route_listing_rejects_inverted_range() {
    let app = TestApp::new(3).await;
    let uri = format!(
        "/trips/route/{}?start_date=2026-05-02&end_date=2026-05-01",
        app.route.id
    );
    let (status, _) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn walk_in_without_seat_is_a_bad_request() {
    let app = TestApp::new(3).await;
    let trip_id = id_of(&app.create_trip(24).await);

    let (status, err) = app
        .send(
            "POST",
            "/tickets",
            Some(json!({
                "user_id": app.customer.id,
                "trip_id": trip_id,
                "stop_id": app.stop.id,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].as_str().unwrap().contains("seat_number"), "{err}");
}

#[tokio::test]
async fn malformed_ticket_id_is_a_bad_request() {
    let app = TestApp::new(3).await;
    let (status, err) = app.send("GET", "/tickets/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].is_string());
}
