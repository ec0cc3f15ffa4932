pub mod models;
pub mod lifecycle;
pub mod trip_code;
pub mod repository;
pub mod notify;
pub mod rules;

pub use lifecycle::TransitionError;
pub use models::{
    Bus, Driver, DriverStatus, PointsEntry, PointsKind, Route, Seat, SeatState, Stop, Ticket,
    TicketFilter, TicketStatus, TicketSummary, TicketType, Trip, TripStatus, User, UserRole,
};
pub use notify::{Notifier, NotifyError, TicketDetails};
pub use repository::{BookingStore, BookingTx, StoreError, StoreResult};
pub use rules::{BookingRules, RolloverPolicy};
pub use trip_code::{SequenceScope, TripCode};

/// Raised when a stored enum column holds a value this build does not know.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
