use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::TicketStatus;

/// What goes into a ticket confirmation email.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TicketDetails {
    pub ticket_number: String,
    pub origin: String,
    pub destination: String,
    pub status: TicketStatus,
    pub seat: Option<String>,
    pub bus: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0} channel is not configured")]
    Disabled(&'static str),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Notification storage failed: {0}")]
    Storage(String),
}

/// Outbound side effects of booking operations. Callers treat every method as
/// best-effort: errors are logged and never fail the booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// In-app notification record.
    async fn notify(&self, user_id: Uuid, subject: &str, message: &str) -> Result<(), NotifyError>;

    async fn send_ticket_email(&self, address: &str, details: &TicketDetails) -> Result<(), NotifyError>;

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotifyError>;

    async fn send_bulk_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifyError>;
}
