use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use transit_core::{
    BookingRules, BookingStore, BookingTx, Notifier, Ticket, TicketDetails, TicketFilter,
    TicketStatus, TicketSummary, TicketType, Trip,
};

use crate::error::BookingError;
use crate::notices::{Outbox, TicketEvent};
use crate::rewards;
use crate::rollover;
use crate::seats;
use crate::signal::RebalanceSignal;

const TICKET_NUMBER_ATTEMPTS: usize = 10;

/// Counter sale: the passenger is present and picks a seat.
#[derive(Debug, Clone, Deserialize)]
pub struct WalkInTicket {
    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub seat_number: String,
    pub stop_id: Option<Uuid>,
    pub recipient_name: Option<String>,
    pub recipient_relationship: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default = "default_true")]
    pub is_confirmed: bool,
    pub served_by: Option<String>,
}

/// Online booking; no seat is held until the ticket is confirmed.
#[derive(Debug, Clone, Deserialize)]
pub struct OnlineBooking {
    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub preferred_seat: Option<String>,
    pub stop_id: Option<Uuid>,
    pub recipient_name: Option<String>,
    pub recipient_relationship: Option<String>,
}

/// Partial update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketChanges {
    pub user_id: Option<Uuid>,
    pub recipient_name: Option<String>,
    pub recipient_relationship: Option<String>,
    pub stop_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
    pub is_paid: Option<bool>,
    pub is_confirmed: Option<bool>,
    pub is_picked: Option<bool>,
    pub served_by: Option<String>,
    pub seat_number: Option<String>,
}

fn default_true() -> bool {
    true
}

pub struct TicketService {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    rules: BookingRules,
    signal: RebalanceSignal,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        rules: BookingRules,
        signal: RebalanceSignal,
    ) -> Self {
        Self { store, notifier, rules, signal }
    }

    /// Sells a seat at the counter. The seat, the ticket, the trip's
    /// saturation state and any points award commit together.
    pub async fn create_walk_in(&self, req: WalkInTicket) -> Result<Ticket, BookingError> {
        let seat_number = req.seat_number.trim().to_string();
        if seat_number.is_empty() {
            return Err(BookingError::validation("Seat number is required"));
        }

        let mut tx = self.store.begin().await?;
        let trip = tx.lock_trip(req.trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        let user = tx.get_user(req.user_id).await?.ok_or(BookingError::NotFound("User"))?;
        if let Some(stop_id) = req.stop_id {
            tx.get_stop(stop_id).await?.ok_or(BookingError::NotFound("Stop"))?;
        }

        seats::reserve(&mut *tx, trip.id, &seat_number).await?;

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: self.issue_ticket_number(&mut *tx).await?,
            user_id: user.id,
            recipient_name: req.recipient_name,
            recipient_relationship: req.recipient_relationship,
            trip_id: trip.id,
            stop_id: req.stop_id,
            preferred_seat: None,
            seat_number: Some(seat_number),
            is_paid: req.is_paid,
            status: TicketStatus::Confirmed,
            ticket_type: TicketType::Walkin,
            is_confirmed: req.is_confirmed,
            is_picked: false,
            served_by: req.served_by,
            created_at: now,
            updated_at: now,
        };
        tx.insert_ticket(&ticket).await?;

        let mut outbox = Outbox::new();
        rollover::evaluate_saturation(&mut *tx, trip.id, self.rules.rollover_policy, &mut outbox).await?;
        if ticket.is_paid {
            rewards::award(&mut *tx, user.id, trip.id, self.rules.points_distance_divisor).await?;
        }
        let details = describe(&mut *tx, &ticket, &trip).await?;
        tx.commit().await?;

        info!(ticket = %ticket.ticket_number, trip_code = %trip.trip_code, seat = ?ticket.seat_number, "Walk-in ticket issued");
        outbox.ticket_event(&user, TicketEvent::Created, details);
        outbox.dispatch(self.notifier.clone(), &self.signal);
        Ok(ticket)
    }

    pub async fn book_online(&self, req: OnlineBooking) -> Result<Ticket, BookingError> {
        let mut tx = self.store.begin().await?;
        let trip = tx.lock_trip(req.trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        let user = tx.get_user(req.user_id).await?.ok_or(BookingError::NotFound("User"))?;
        if let Some(stop_id) = req.stop_id {
            tx.get_stop(stop_id).await?.ok_or(BookingError::NotFound("Stop"))?;
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: self.issue_ticket_number(&mut *tx).await?,
            user_id: user.id,
            recipient_name: req.recipient_name,
            recipient_relationship: req.recipient_relationship,
            trip_id: trip.id,
            stop_id: req.stop_id,
            preferred_seat: req.preferred_seat.filter(|s| !s.trim().is_empty()),
            seat_number: None,
            is_paid: false,
            status: TicketStatus::Pending,
            ticket_type: TicketType::Online,
            is_confirmed: false,
            is_picked: false,
            served_by: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_ticket(&ticket).await?;
        let details = describe(&mut *tx, &ticket, &trip).await?;
        tx.commit().await?;

        info!(ticket = %ticket.ticket_number, trip_code = %trip.trip_code, "Online booking received");
        let mut outbox = Outbox::new();
        outbox.ticket_event(&user, TicketEvent::Booked, details);
        outbox.dispatch(self.notifier.clone(), &self.signal);
        Ok(ticket)
    }

    pub async fn update_ticket(&self, ticket_id: Uuid, changes: TicketChanges) -> Result<Ticket, BookingError> {
        let mut tx = self.store.begin().await?;
        let mut ticket = tx.get_ticket(ticket_id).await?.ok_or(BookingError::NotFound("Ticket"))?;
        let trip = tx.lock_trip(ticket.trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        let was_paid = ticket.is_paid;
        let previous = ticket.status;

        if let Some(user_id) = changes.user_id {
            tx.get_user(user_id).await?.ok_or(BookingError::NotFound("User"))?;
            ticket.user_id = user_id;
        }
        if let Some(stop_id) = changes.stop_id {
            tx.get_stop(stop_id).await?.ok_or(BookingError::NotFound("Stop"))?;
            ticket.stop_id = Some(stop_id);
        }
        if let Some(name) = changes.recipient_name {
            ticket.recipient_name = Some(name);
        }
        if let Some(relationship) = changes.recipient_relationship {
            ticket.recipient_relationship = Some(relationship);
        }

        let next = match changes.status {
            Some(status) => previous.transition(status)?,
            None => previous,
        };
        let requested_seat = changes
            .seat_number
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if next == TicketStatus::Cancelled {
            if requested_seat.is_some() {
                return Err(BookingError::validation("Cannot assign a seat to a cancelled ticket"));
            }
            if previous != TicketStatus::Cancelled {
                if let Some(seat) = ticket.seat_number.as_deref() {
                    seats::release(&mut *tx, trip.id, seat).await?;
                }
            }
        } else if let Some(seat) = requested_seat {
            if ticket.seat_number.as_deref() != Some(seat.as_str()) {
                if let Some(old) = ticket.seat_number.as_deref() {
                    seats::release(&mut *tx, trip.id, old).await?;
                }
                seats::reserve(&mut *tx, trip.id, &seat).await?;
                ticket.seat_number = Some(seat);
            }
        } else if previous == TicketStatus::Pending
            && next == TicketStatus::Confirmed
            && ticket.seat_number.is_none()
        {
            if let Some(preferred) = ticket.preferred_seat.clone() {
                seats::reserve(&mut *tx, trip.id, &preferred).await?;
                ticket.seat_number = Some(preferred);
            }
        }

        ticket.status = next;
        if next == TicketStatus::Confirmed && previous != TicketStatus::Confirmed {
            ticket.is_confirmed = true;
        }
        if let Some(confirmed) = changes.is_confirmed {
            ticket.is_confirmed = confirmed;
        }
        if let Some(paid) = changes.is_paid {
            ticket.is_paid = paid;
        }
        if let Some(picked) = changes.is_picked {
            ticket.is_picked = picked;
        }
        if let Some(served_by) = changes.served_by {
            ticket.served_by = Some(served_by);
        }
        ticket.updated_at = Utc::now();
        tx.update_ticket(&ticket).await?;

        let mut outbox = Outbox::new();
        rollover::evaluate_saturation(&mut *tx, trip.id, self.rules.rollover_policy, &mut outbox).await?;
        if !was_paid && ticket.is_paid {
            rewards::award(&mut *tx, ticket.user_id, trip.id, self.rules.points_distance_divisor).await?;
        }

        let user = tx.get_user(ticket.user_id).await?.ok_or(BookingError::NotFound("User"))?;
        let details = describe(&mut *tx, &ticket, &trip).await?;
        tx.commit().await?;

        info!(ticket = %ticket.ticket_number, from = %previous, to = %next, "Ticket updated");
        outbox.ticket_event(&user, TicketEvent::Updated, details);
        outbox.dispatch(self.notifier.clone(), &self.signal);
        Ok(ticket)
    }

    /// Hard delete. Refused once the trip has left.
    pub async fn delete_ticket(&self, ticket_id: Uuid) -> Result<(), BookingError> {
        let mut tx = self.store.begin().await?;
        let ticket = tx.get_ticket(ticket_id).await?.ok_or(BookingError::NotFound("Ticket"))?;
        let trip = tx.lock_trip(ticket.trip_id).await?.ok_or(BookingError::NotFound("Trip"))?;
        if trip.status.has_departed() {
            return Err(BookingError::TripAlreadyDeparted(trip.status));
        }

        if let Some(seat) = ticket.seat_number.as_deref() {
            if !seats::release(&mut *tx, trip.id, seat).await? {
                warn!(ticket = %ticket.ticket_number, seat, "Deleted ticket held a seat missing from the ledger");
            }
        }
        tx.delete_ticket(ticket.id).await?;

        let mut outbox = Outbox::new();
        rollover::evaluate_saturation(&mut *tx, trip.id, self.rules.rollover_policy, &mut outbox).await?;
        tx.commit().await?;

        info!(ticket = %ticket.ticket_number, trip_code = %trip.trip_code, "Ticket deleted");
        outbox.dispatch(self.notifier.clone(), &self.signal);
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: Uuid, search: Option<String>) -> Result<Vec<TicketSummary>, BookingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.search_tickets(&TicketFilter::for_user(user_id, search)).await?)
    }

    pub async fn list(&self, search: Option<String>) -> Result<Vec<TicketSummary>, BookingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.search_tickets(&TicketFilter::all(search)).await?)
    }

    pub async fn get(&self, ticket_id: Uuid) -> Result<TicketSummary, BookingError> {
        let mut tx = self.store.begin().await?;
        tx.search_tickets(&TicketFilter::by_id(ticket_id))
            .await?
            .into_iter()
            .next()
            .ok_or(BookingError::NotFound("Ticket"))
    }

    async fn issue_ticket_number(&self, tx: &mut dyn BookingTx) -> Result<String, BookingError> {
        for _ in 0..TICKET_NUMBER_ATTEMPTS {
            let digits: u32 = rand::thread_rng().gen_range(0..1_000_000);
            let candidate = format!("{}-{:06}", self.rules.ticket_prefix, digits);
            if !tx.ticket_number_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(BookingError::Storage("could not allocate a unique ticket number".into()))
    }
}

async fn describe(tx: &mut dyn BookingTx, ticket: &Ticket, trip: &Trip) -> Result<TicketDetails, BookingError> {
    let route = tx.get_route(trip.route_id).await?.ok_or(BookingError::NotFound("Route"))?;
    let bus = tx.get_bus(trip.bus_id).await?.ok_or(BookingError::NotFound("Bus"))?;
    Ok(TicketDetails {
        ticket_number: ticket.ticket_number.clone(),
        origin: route.origin,
        destination: route.destination,
        status: ticket.status,
        seat: ticket.seat_number.clone(),
        bus: bus.bus_number,
    })
}
