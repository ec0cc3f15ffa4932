pub mod error;
pub mod licensing;
pub mod notices;
pub mod rewards;
pub mod rollover;
pub mod seats;
pub mod signal;
pub mod tickets;
pub mod trips;

#[cfg(test)]
mod testing;

pub use error::BookingError;
pub use licensing::LicenseMonitor;
pub use rewards::RewardsService;
pub use rollover::Saturation;
pub use signal::RebalanceSignal;
pub use tickets::{OnlineBooking, TicketChanges, TicketService, WalkInTicket};
pub use trips::{NewTrip, SeatsReleased, TripChanges, TripDetails, TripService};
