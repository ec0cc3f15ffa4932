use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use transit_core::{Notifier, TicketDetails, User};
use transit_shared::{Masked, RebalanceRequested};

use crate::signal::RebalanceSignal;

#[derive(Debug, Clone, PartialEq)]
enum Outgoing {
    Notification { user_id: Uuid, subject: String, message: String },
    TicketEmail { address: String, details: TicketDetails },
    Sms { to: String, body: String },
    BulkSms { recipients: Vec<String>, body: String },
}

/// Side effects collected while a transaction is open and released only after
/// it commits. Delivery failures are logged and swallowed.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outgoing>,
    rebalance: Vec<RebalanceRequested>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&mut self, user_id: Uuid, subject: impl Into<String>, message: impl Into<String>) {
        self.items.push(Outgoing::Notification {
            user_id,
            subject: subject.into(),
            message: message.into(),
        });
    }

    pub fn ticket_email(&mut self, address: impl Into<String>, details: TicketDetails) {
        self.items.push(Outgoing::TicketEmail { address: address.into(), details });
    }

    pub fn sms(&mut self, to: impl Into<String>, body: impl Into<String>) {
        self.items.push(Outgoing::Sms { to: to.into(), body: body.into() });
    }

    pub fn bulk_sms(&mut self, recipients: Vec<String>, body: impl Into<String>) {
        if recipients.is_empty() {
            return;
        }
        self.items.push(Outgoing::BulkSms { recipients, body: body.into() });
    }

    pub fn rebalance(&mut self, event: RebalanceRequested) {
        self.rebalance.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.rebalance.is_empty()
    }

    /// Queue the in-app notice, the ticket email and the SMS a passenger gets
    /// for a ticket event. Channels the user has no address for are skipped.
    pub fn ticket_event(&mut self, user: &User, event: TicketEvent, details: TicketDetails) {
        let message = event.message(&details);
        self.notify(user.id, event.subject(), message.clone());
        if let Some(email) = &user.email {
            self.ticket_email(email.clone(), details);
        }
        if let Some(phone) = &user.phone {
            self.sms(phone.clone(), message);
        }
    }

    /// Delivers everything inline. Used off the request path, where waiting
    /// on the gateways costs nothing.
    pub async fn flush(self, notifier: &dyn Notifier, signal: &RebalanceSignal) {
        deliver(self.items, notifier).await;
        raise_all(self.rebalance, signal);
    }

    /// Raises rebalance requests immediately and hands the deliveries to a
    /// background task, so the caller does not wait on SMTP or the SMS
    /// gateway. `None` when there is nothing to deliver.
    pub fn dispatch(self, notifier: Arc<dyn Notifier>, signal: &RebalanceSignal) -> Option<JoinHandle<()>> {
        raise_all(self.rebalance, signal);
        if self.items.is_empty() {
            return None;
        }
        let items = self.items;
        Some(tokio::spawn(async move {
            deliver(items, notifier.as_ref()).await;
        }))
    }
}

fn raise_all(events: Vec<RebalanceRequested>, signal: &RebalanceSignal) {
    for event in events {
        signal.raise(event);
    }
}

async fn deliver(items: Vec<Outgoing>, notifier: &dyn Notifier) {
    for item in items {
        match item {
            Outgoing::Notification { user_id, subject, message } => {
                if let Err(e) = notifier.notify(user_id, &subject, &message).await {
                    warn!(%user_id, %subject, error = %e, "Failed to record notification");
                }
            }
            Outgoing::TicketEmail { address, details } => {
                if let Err(e) = notifier.send_ticket_email(&address, &details).await {
                    warn!(to = %Masked(&address), ticket = %details.ticket_number, error = %e, "Failed to send ticket email");
                }
            }
            Outgoing::Sms { to, body } => {
                if let Err(e) = notifier.send_sms(&to, &body).await {
                    warn!(to = %Masked(&to), error = %e, "Failed to send SMS");
                }
            }
            Outgoing::BulkSms { recipients, body } => {
                if let Err(e) = notifier.send_bulk_sms(&recipients, &body).await {
                    warn!(recipients = recipients.len(), error = %e, "Failed to send bulk SMS");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEvent {
    Created,
    Booked,
    Updated,
}

impl TicketEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            TicketEvent::Created => "Ticket Created",
            TicketEvent::Booked => "Trip Booked",
            TicketEvent::Updated => "Ticket Updated",
        }
    }

    pub fn message(&self, d: &TicketDetails) -> String {
        match self {
            TicketEvent::Created => format!(
                "Your ticket for the trip from {} to {} on bus {} has been created. Ticket Number: {}{}.",
                d.origin,
                d.destination,
                d.bus,
                d.ticket_number,
                d.seat.as_deref().map(|s| format!(", Seat: {s}")).unwrap_or_default()
            ),
            TicketEvent::Booked => format!(
                "Your trip from {} to {} on bus {} has been booked. Ticket Number: {}. Status: {}.",
                d.origin, d.destination, d.bus, d.ticket_number, d.status
            ),
            TicketEvent::Updated => format!(
                "Your ticket {} for the trip from {} to {} on bus {} has been updated. Status: {}.",
                d.ticket_number, d.origin, d.destination, d.bus, d.status
            ),
        }
    }
}

pub fn trip_status_sms(trip_code: &str, status: &str) -> String {
    format!(
        "Trip Status Update: The trip with code {} has now been {}. Thank you for choosing us!",
        trip_code, status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_core::{TicketStatus, UserRole};
    use transit_store::memory::{Delivery, RecordingNotifier};

    fn details() -> TicketDetails {
        TicketDetails {
            ticket_number: "TKT-000042".to_string(),
            origin: "Accra".to_string(),
            destination: "Kumasi".to_string(),
            status: TicketStatus::Confirmed,
            seat: Some("ST04".to_string()),
            bus: "GT-2041".to_string(),
        }
    }

    fn user(email: Option<&str>, phone: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ama".to_string(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            role: UserRole::Customer,
            total_points: 0,
        }
    }

    #[test]
    fn created_message_mentions_seat() {
        let msg = TicketEvent::Created.message(&details());
        assert_eq!(
            msg,
            "Your ticket for the trip from Accra to Kumasi on bus GT-2041 has been created. Ticket Number: TKT-000042, Seat: ST04."
        );
    }

    #[tokio::test]
    async fn ticket_event_skips_missing_channels() {
        let notifier = RecordingNotifier::new();
        let mut outbox = Outbox::new();
        outbox.ticket_event(&user(None, Some("+233200000001")), TicketEvent::Updated, details());
        outbox.flush(&notifier, &RebalanceSignal::disabled()).await;

        let deliveries = notifier.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(deliveries[0], Delivery::Notification { .. }));
        assert!(matches!(&deliveries[1], Delivery::Sms { to, .. } if to == "+233200000001"));
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed_and_signals_still_raised() {
        let notifier = RecordingNotifier::failing();
        let (signal, mut rx) = RebalanceSignal::channel();
        let route_id = Uuid::new_v4();

        let mut outbox = Outbox::new();
        outbox.ticket_event(&user(Some("ama@example.com"), None), TicketEvent::Created, details());
        outbox.rebalance(RebalanceRequested::new(
            route_id,
            None,
            transit_shared::RebalanceReason::TripScheduled,
        ));
        outbox.flush(&notifier, &signal).await;

        assert!(notifier.deliveries().is_empty());
        assert_eq!(rx.recv().await.unwrap().route_id, route_id);
    }

    #[tokio::test]
    async fn dispatch_raises_signals_before_delivering_in_background() {
        let notifier = RecordingNotifier::new();
        let (signal, mut rx) = RebalanceSignal::channel();
        let route_id = Uuid::new_v4();

        let mut outbox = Outbox::new();
        outbox.ticket_event(&user(Some("ama@example.com"), None), TicketEvent::Booked, details());
        outbox.rebalance(RebalanceRequested::new(
            route_id,
            None,
            transit_shared::RebalanceReason::TripScheduled,
        ));
        let handle = outbox.dispatch(Arc::new(notifier.clone()), &signal).unwrap();

        assert_eq!(rx.try_recv().unwrap().route_id, route_id);
        handle.await.unwrap();
        let deliveries = notifier.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(&deliveries[1], Delivery::Email { address, .. } if address == "ama@example.com"));
    }

    #[test]
    fn dispatch_without_deliveries_spawns_nothing() {
        let mut outbox = Outbox::new();
        outbox.rebalance(RebalanceRequested::new(
            Uuid::new_v4(),
            None,
            transit_shared::RebalanceReason::TripScheduled,
        ));
        assert!(outbox
            .dispatch(Arc::new(RecordingNotifier::new()), &RebalanceSignal::disabled())
            .is_none());
    }

    #[test]
    fn empty_bulk_sms_is_not_queued() {
        let mut outbox = Outbox::new();
        outbox.bulk_sms(Vec::new(), "hello");
        assert!(outbox.is_empty());
    }
}
