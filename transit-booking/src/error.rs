use transit_core::{StoreError, TransitionError, TripStatus};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("Seat {0} is not available")]
    SeatUnavailable(String),

    #[error("A trip with the same bus, driver and embark time already exists")]
    SchedulingConflict,

    #[error("Bus {bus_number} already has {assigned} trips, at or above its capacity of {capacity}")]
    BusCapacityExceeded {
        bus_number: String,
        assigned: i64,
        capacity: i32,
    },

    #[error("Trip {0} is fully booked and no later trip on the route is open for booking")]
    NoAvailableSuccessor(String),

    #[error("Cannot change tickets on a trip that is already {0}")]
    TripAlreadyDeparted(TripStatus),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("No confirmed passengers alight at this stop")]
    NoPassengersAtStop,

    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Storage(err)
    }
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::Validation(msg.into())
    }
}
