use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use transit_core::{
    BookingStore, BookingTx, Bus, Driver, DriverStatus, PointsEntry, Route, Seat, Stop,
    StoreError, StoreResult, Ticket, TicketFilter, TicketSummary, Trip, User, UserRole,
};

/// Postgres-backed [`BookingStore`]. Each `begin` opens a database
/// transaction; dropping the returned handle rolls it back.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBookingTx { tx }))
    }
}

pub struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    trip_code: String,
    bus_id: Uuid,
    driver_id: Uuid,
    route_id: Uuid,
    embark_time: DateTime<Utc>,
    arrival_time: Option<DateTime<Utc>>,
    status: String,
    is_scheduled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            trip_code: row.trip_code,
            bus_id: row.bus_id,
            driver_id: row.driver_id,
            route_id: row.route_id,
            embark_time: row.embark_time,
            arrival_time: row.arrival_time,
            status: row.status.parse()?,
            is_scheduled: row.is_scheduled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    trip_id: Uuid,
    seat_number: String,
    state: String,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat { trip_id: row.trip_id, seat_number: row.seat_number, state: row.state.parse()? })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    ticket_number: String,
    user_id: Uuid,
    recipient_name: Option<String>,
    recipient_relationship: Option<String>,
    trip_id: Uuid,
    stop_id: Option<Uuid>,
    preferred_seat: Option<String>,
    seat_number: Option<String>,
    is_paid: bool,
    status: String,
    ticket_type: String,
    is_confirmed: bool,
    is_picked: bool,
    served_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            ticket_number: row.ticket_number,
            user_id: row.user_id,
            recipient_name: row.recipient_name,
            recipient_relationship: row.recipient_relationship,
            trip_id: row.trip_id,
            stop_id: row.stop_id,
            preferred_seat: row.preferred_seat,
            seat_number: row.seat_number,
            is_paid: row.is_paid,
            status: row.status.parse()?,
            ticket_type: row.ticket_type.parse()?,
            is_confirmed: row.is_confirmed,
            is_picked: row.is_picked,
            served_by: row.served_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketSummaryRow {
    #[sqlx(flatten)]
    ticket: TicketRow,
    trip_code: String,
    origin: String,
    destination: String,
    bus_number: String,
    passenger_name: String,
    passenger_email: Option<String>,
}

impl TryFrom<TicketSummaryRow> for TicketSummary {
    type Error = StoreError;

    fn try_from(row: TicketSummaryRow) -> Result<Self, Self::Error> {
        Ok(TicketSummary {
            ticket: row.ticket.try_into()?,
            trip_code: row.trip_code,
            origin: row.origin,
            destination: row.destination,
            bus_number: row.bus_number,
            passenger_name: row.passenger_name,
            passenger_email: row.passenger_email,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BusRow {
    id: Uuid,
    name: String,
    model: String,
    bus_number: String,
    capacity: i32,
}

#[derive(sqlx::FromRow)]
struct DriverRow {
    id: Uuid,
    user_id: Uuid,
    driver_no: Option<String>,
    license_number: String,
    license_expiry: Option<NaiveDate>,
    status: String,
}

impl TryFrom<DriverRow> for Driver {
    type Error = StoreError;

    fn try_from(row: DriverRow) -> Result<Self, Self::Error> {
        Ok(Driver {
            id: row.id,
            user_id: row.user_id,
            driver_no: row.driver_no,
            license_number: row.license_number,
            license_expiry: row.license_expiry,
            status: row.status.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: Uuid,
    origin: String,
    destination: String,
    distance: Option<f64>,
    duration: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct StopRow {
    id: Uuid,
    route_id: Uuid,
    stop_name: String,
    price: f64,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    role: String,
    total_points: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            role: row.role.parse()?,
            total_points: row.total_points,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PointsRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    points: i64,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PointsRow> for PointsEntry {
    type Error = StoreError;

    fn try_from(row: PointsRow) -> Result<Self, Self::Error> {
        Ok(PointsEntry {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind.parse()?,
            points: row.points,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

const TRIP_COLUMNS: &str = "id, trip_code, bus_id, driver_id, route_id, embark_time, arrival_time, \
    status, is_scheduled, created_at, updated_at";

const TICKET_COLUMNS: &str = "t.id, t.ticket_number, t.user_id, t.recipient_name, t.recipient_relationship, \
    t.trip_id, t.stop_id, t.preferred_seat, t.seat_number, t.is_paid, t.status, t.ticket_type, \
    t.is_confirmed, t.is_picked, t.served_by, t.created_at, t.updated_at";

const USER_COLUMNS: &str = "id, name, email, phone, role, total_points";

const DRIVER_COLUMNS: &str = "id, user_id, driver_no, license_number, license_expiry, status";

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn get_bus(&mut self, id: Uuid) -> StoreResult<Option<Bus>> {
        let row = sqlx::query_as::<_, BusRow>(
            "SELECT id, name, model, bus_number, capacity FROM buses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|r| Bus {
            id: r.id,
            name: r.name,
            model: r.model,
            bus_number: r.bus_number,
            capacity: r.capacity,
        }))
    }

    async fn get_driver(&mut self, id: Uuid) -> StoreResult<Option<Driver>> {
        let row = sqlx::query_as::<_, DriverRow>(&format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Driver::try_from).transpose()
    }

    async fn get_route(&mut self, id: Uuid) -> StoreResult<Option<Route>> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT id, origin, destination, distance, duration FROM routes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|r| Route {
            id: r.id,
            origin: r.origin,
            destination: r.destination,
            distance: r.distance,
            duration: r.duration,
        }))
    }

    async fn get_stop(&mut self, id: Uuid) -> StoreResult<Option<Stop>> {
        let row = sqlx::query_as::<_, StopRow>("SELECT id, route_id, stop_name, price FROM stops WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| Stop { id: r.id, route_id: r.route_id, stop_name: r.stop_name, price: r.price }))
    }

    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn list_users_by_role(&mut self, roles: &[UserRole]) -> StoreResult<Vec<User>> {
        let roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = ANY($1) ORDER BY name"
        ))
        .bind(roles)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn list_expired_licenses(&mut self, today: NaiveDate) -> StoreResult<Vec<Driver>> {
        let rows = sqlx::query_as::<_, DriverRow>(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers
             WHERE license_expiry < $1 AND status <> 'suspended'
             FOR UPDATE"
        ))
        .bind(today)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn set_driver_status(&mut self, id: Uuid, status: DriverStatus) -> StoreResult<()> {
        sqlx::query("UPDATE drivers SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn next_trip_sequence(&mut self, counter_key: &str) -> StoreResult<u32> {
        let value: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO trip_code_counters (scope_key, last_value)
            VALUES ($1, 1)
            ON CONFLICT (scope_key) DO UPDATE SET last_value = trip_code_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(counter_key)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(u32::try_from(value)?)
    }

    async fn find_conflicting_trip(
        &mut self,
        bus_id: Uuid,
        driver_id: Uuid,
        embark_time: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> StoreResult<Option<Uuid>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM trips
             WHERE bus_id = $1 AND driver_id = $2 AND embark_time = $3
               AND ($4::uuid IS NULL OR id <> $4)
             LIMIT 1",
        )
        .bind(bus_id)
        .bind(driver_id)
        .bind(embark_time)
        .bind(exclude)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn insert_trip(&mut self, trip: &Trip) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trips (id, trip_code, bus_id, driver_id, route_id, embark_time, arrival_time,
                               status, is_scheduled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(trip.id)
        .bind(&trip.trip_code)
        .bind(trip.bus_id)
        .bind(trip.driver_id)
        .bind(trip.route_id)
        .bind(trip.embark_time)
        .bind(trip.arrival_time)
        .bind(trip.status.as_str())
        .bind(trip.is_scheduled)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn update_trip(&mut self, trip: &Trip) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE trips
            SET bus_id = $2, driver_id = $3, route_id = $4, embark_time = $5, arrival_time = $6,
                status = $7, is_scheduled = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(trip.id)
        .bind(trip.bus_id)
        .bind(trip.driver_id)
        .bind(trip.route_id)
        .bind(trip.embark_time)
        .bind(trip.arrival_time)
        .bind(trip.status.as_str())
        .bind(trip.is_scheduled)
        .bind(trip.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_trip(&mut self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn next_trip_on_route(
        &mut self,
        route_id: Uuid,
        after: DateTime<Utc>,
    ) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips
             WHERE route_id = $1 AND embark_time > $2 AND status = 'scheduled'
             ORDER BY embark_time ASC
             LIMIT 1
             FOR UPDATE"
        ))
        .bind(route_id)
        .bind(after)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn list_trips_for_route(
        &mut self,
        route_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips
             WHERE route_id = $1
               AND ($2::timestamptz IS NULL OR embark_time >= $2)
               AND ($3::timestamptz IS NULL OR embark_time <= $3)
             ORDER BY embark_time DESC"
        ))
        .bind(route_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn count_trips_for_bus(&mut self, bus_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trips WHERE bus_id = $1")
            .bind(bus_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
        if seats.is_empty() {
            return Ok(());
        }
        let trip_ids: Vec<Uuid> = seats.iter().map(|s| s.trip_id).collect();
        let labels: Vec<String> = seats.iter().map(|s| s.seat_number.clone()).collect();
        let states: Vec<String> = seats.iter().map(|s| s.state.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO seats (trip_id, seat_number, state)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[])
            "#,
        )
        .bind(trip_ids)
        .bind(labels)
        .bind(states)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn reserve_seat(&mut self, trip_id: Uuid, seat_number: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE seats SET state = 'reserved' WHERE trip_id = $1 AND seat_number = $2 AND state = 'available'",
        )
        .bind(trip_id)
        .bind(seat_number)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_seat(&mut self, trip_id: Uuid, seat_number: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE seats SET state = 'available' WHERE trip_id = $1 AND seat_number = $2")
            .bind(trip_id)
            .bind(seat_number)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_seats(&mut self, trip_id: Uuid, seat_numbers: &[String]) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE seats SET state = 'available' WHERE trip_id = $1 AND seat_number = ANY($2)",
        )
        .bind(trip_id)
        .bind(seat_numbers)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_seats(&mut self, trip_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM seats WHERE trip_id = $1")
            .bind(trip_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_seats(&mut self, trip_id: Uuid) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT trip_id, seat_number, state FROM seats WHERE trip_id = $1 ORDER BY seat_number",
        )
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn ticket_number_exists(&mut self, ticket_number: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickets WHERE ticket_number = $1)")
            .bind(ticket_number)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, ticket_number, user_id, recipient_name, recipient_relationship,
                                 trip_id, stop_id, preferred_seat, seat_number, is_paid, status,
                                 ticket_type, is_confirmed, is_picked, served_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.ticket_number)
        .bind(ticket.user_id)
        .bind(&ticket.recipient_name)
        .bind(&ticket.recipient_relationship)
        .bind(ticket.trip_id)
        .bind(ticket.stop_id)
        .bind(&ticket.preferred_seat)
        .bind(&ticket.seat_number)
        .bind(ticket.is_paid)
        .bind(ticket.status.as_str())
        .bind(ticket.ticket_type.as_str())
        .bind(ticket.is_confirmed)
        .bind(ticket.is_picked)
        .bind(&ticket.served_by)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!("SELECT {TICKET_COLUMNS} FROM tickets t WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Ticket::try_from).transpose()
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE tickets
            SET user_id = $2, recipient_name = $3, recipient_relationship = $4, stop_id = $5,
                preferred_seat = $6, seat_number = $7, is_paid = $8, status = $9, is_confirmed = $10,
                is_picked = $11, served_by = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.user_id)
        .bind(&ticket.recipient_name)
        .bind(&ticket.recipient_relationship)
        .bind(ticket.stop_id)
        .bind(&ticket.preferred_seat)
        .bind(&ticket.seat_number)
        .bind(ticket.is_paid)
        .bind(ticket.status.as_str())
        .bind(ticket.is_confirmed)
        .bind(ticket.is_picked)
        .bind(&ticket.served_by)
        .bind(ticket.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_confirmed_tickets(&mut self, trip_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE trip_id = $1 AND status = 'confirmed'",
        )
        .bind(trip_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn list_trip_tickets(&mut self, trip_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets t WHERE t.trip_id = $1 ORDER BY t.created_at DESC"
        ))
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn list_confirmed_at_stop(&mut self, trip_id: Uuid, stop_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets t
             WHERE t.trip_id = $1 AND t.stop_id = $2 AND t.status = 'confirmed'"
        ))
        .bind(trip_id)
        .bind(stop_id)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn search_tickets(&mut self, filter: &TicketFilter) -> StoreResult<Vec<TicketSummary>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, TicketSummaryRow>(&format!(
            "SELECT {TICKET_COLUMNS}, tr.trip_code, r.origin, r.destination, b.bus_number,
                    u.name AS passenger_name, u.email AS passenger_email
             FROM tickets t
             JOIN trips tr ON tr.id = t.trip_id
             JOIN routes r ON r.id = tr.route_id
             JOIN buses b ON b.id = tr.bus_id
             JOIN users u ON u.id = t.user_id
             WHERE ($1::uuid IS NULL OR t.id = $1)
               AND ($2::uuid IS NULL OR t.user_id = $2)
               AND ($3::text IS NULL
                    OR t.ticket_number ILIKE $3
                    OR ($2::uuid IS NOT NULL AND (r.origin ILIKE $3 OR r.destination ILIKE $3))
                    OR ($2::uuid IS NULL AND (u.name ILIKE $3 OR u.email ILIKE $3)))
             ORDER BY t.created_at DESC"
        ))
        .bind(filter.ticket_id)
        .bind(filter.user_id)
        .bind(pattern)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn passenger_phones(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>> {
        let phones: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT u.phone
            FROM tickets t
            JOIN users u ON u.id = t.user_id
            WHERE t.trip_id = $1 AND u.phone IS NOT NULL AND u.phone <> ''
            "#,
        )
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(phones)
    }

    async fn add_user_points(&mut self, user_id: Uuid, points: i64) -> StoreResult<Option<i64>> {
        let total: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET total_points = total_points + $2 WHERE id = $1 RETURNING total_points",
        )
        .bind(user_id)
        .bind(points)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(total)
    }

    async fn insert_points_entry(&mut self, entry: &PointsEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO points_history (id, user_id, kind, points, description, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.points)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_points_entries(&mut self, user_id: Uuid) -> StoreResult<Vec<PointsEntry>> {
        let rows = sqlx::query_as::<_, PointsRow>(
            "SELECT id, user_id, kind, points, description, created_at
             FROM points_history WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(rows)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("acc"), "%acc%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
