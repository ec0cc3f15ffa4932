use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use transit_booking::BookingError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound(_) | BookingError::NoPassengersAtStop => AppError::NotFound(err.to_string()),
            BookingError::Storage(e) => AppError::InternalServerError(e.to_string()),
            BookingError::Validation(_)
            | BookingError::SeatUnavailable(_)
            | BookingError::SchedulingConflict
            | BookingError::BusCapacityExceeded { .. }
            | BookingError::NoAvailableSuccessor(_)
            | BookingError::TripAlreadyDeparted(_)
            | BookingError::InvalidTransition(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_core::TripStatus;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn booking_errors_map_to_http_status() {
        assert_eq!(status_of(BookingError::NotFound("Ticket")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::NoPassengersAtStop), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::SeatUnavailable("ST01".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BookingError::TripAlreadyDeparted(TripStatus::Embarked)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(BookingError::Storage("pool timed out".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
