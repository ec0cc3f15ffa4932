use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use transit_booking::{OnlineBooking, SeatsReleased, TicketChanges, WalkInTicket};
use transit_core::{Ticket, TicketSummary};

use crate::error::AppError;
use crate::extract::{JsonBody, PathParams, QueryParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route("/tickets/book", post(book_ticket))
        .route("/tickets/user/{user_id}", get(list_user_tickets))
        .route(
            "/tickets/{id}",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route(
            "/tickets/trips/{trip_id}/stops/{stop_id}/update-seats",
            put(release_seats_at_stop),
        )
}

/// GET /tickets?search=
async fn list_tickets(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> Result<Json<Vec<TicketSummary>>, AppError> {
    Ok(Json(state.tickets.list(query.search).await?))
}

/// POST /tickets
async fn create_ticket(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<WalkInTicket>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state.tickets.create_walk_in(req).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// POST /tickets/book
async fn book_ticket(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<OnlineBooking>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state.tickets.book_online(req).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<TicketSummary>, AppError> {
    Ok(Json(state.tickets.get(id).await?))
}

async fn update_ticket(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(changes): JsonBody<TicketChanges>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.tickets.update_ticket(id, changes).await?))
}

async fn delete_ticket(
    State(state): State<AppState>,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.tickets.delete_ticket(id).await?;
    Ok(Json(json!({ "message": "Ticket deleted successfully" })))
}

/// GET /tickets/user/:user_id?search=
async fn list_user_tickets(
    State(state): State<AppState>,
    PathParams(user_id): PathParams<Uuid>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> Result<Json<Vec<TicketSummary>>, AppError> {
    Ok(Json(state.tickets.list_for_user(user_id, query.search).await?))
}

/// PUT /tickets/trips/:trip_id/stops/:stop_id/update-seats
async fn release_seats_at_stop(
    State(state): State<AppState>,
    PathParams((trip_id, stop_id)): PathParams<(Uuid, Uuid)>,
) -> Result<Json<SeatsReleased>, AppError> {
    Ok(Json(state.trips.release_seats_at_stop(trip_id, stop_id).await?))
}
