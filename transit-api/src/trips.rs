use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use transit_booking::{NewTrip, TripChanges, TripDetails};
use transit_core::Trip;

use crate::error::AppError;
use crate::extract::{JsonBody, PathParams, QueryParams};
use crate::state::AppState;

/// Whole days, inclusive at both ends.
#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let from = self.start_date.map(|d| d.and_time(NaiveTime::MIN).and_utc());
        let to = self
            .end_date
            .map(|d| d.and_time(NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::microseconds(1));
        (from, to)
    }
}

#[derive(Debug, Serialize)]
struct RebalanceResponse {
    route_id: Uuid,
    promoted: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/trips", post(create_trip))
        .route("/trips/route/{route_id}", get(list_route_trips))
        .route("/trips/{id}", get(get_trip).put(update_trip).delete(delete_trip))
        .route("/routes/{route_id}/rebalance", post(rebalance_route))
}

async fn create_trip(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewTrip>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state.trips.create_trip(req).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<TripDetails>, AppError> {
    Ok(Json(state.trips.get_trip(id).await?))
}

/// PUT /trips/:id
///
/// Bus reassignment, driver/route/time edits and status changes all go
/// through here; status changes are checked against the trip lifecycle.
async fn update_trip(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(changes): JsonBody<TripChanges>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.update_trip(id, changes).await?))
}

async fn delete_trip(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.trips.delete_trip(id).await?;
    Ok(Json(json!({ "message": "Trip deleted successfully" })))
}

/// GET /trips/route/:route_id?start_date=&end_date=
async fn list_route_trips(
    State(state): State<AppState>,
    PathParams(route_id): PathParams<Uuid>,
    QueryParams(range): QueryParams<DateRange>,
) -> Result<Json<Vec<Trip>>, AppError> {
    let (from, to) = range.bounds();
    Ok(Json(state.trips.list_for_route(route_id, from, to).await?))
}

async fn rebalance_route(
    State(state): State<AppState>,
    PathParams(route_id): PathParams<Uuid>,
) -> Result<Json<RebalanceResponse>, AppError> {
    let promoted = state.trips.rebalance_route(route_id).await?;
    Ok(Json(RebalanceResponse { route_id, promoted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_covers_whole_days() {
        let range = DateRange {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 1),
        };
        let (from, to) = range.bounds();
        let (from, to) = (from.unwrap(), to.unwrap());
        assert_eq!(from.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert!(to > from);
        assert_eq!(to.date_naive(), from.date_naive());
    }
}
