use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use transit_core::{Notifier, NotifyError, TicketDetails};
use transit_shared::Masked;

use crate::app_config::{EmailConfig, SmsConfig};

/// Production [`Notifier`]: in-app notices go to the `notifications` table,
/// email through SMTP and SMS through the gateway's HTTP API.
pub struct Dispatcher {
    pool: PgPool,
    email: Option<SmtpMailer>,
    sms: Option<SmsGateway>,
}

impl Dispatcher {
    pub fn new(pool: PgPool, email: &EmailConfig, sms: &SmsConfig) -> Result<Self, NotifyError> {
        let email = if email.enabled { Some(SmtpMailer::new(email)?) } else { None };
        let sms = if sms.enabled { Some(SmsGateway::new(sms)?) } else { None };
        if email.is_none() {
            info!("Email delivery disabled");
        }
        if sms.is_none() {
            info!("SMS delivery disabled");
        }
        Ok(Self { pool, email, sms })
    }
}

#[async_trait]
impl Notifier for Dispatcher {
    async fn notify(&self, user_id: Uuid, subject: &str, message: &str) -> Result<(), NotifyError> {
        sqlx::query("INSERT INTO notifications (id, user_id, subject, message) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(subject)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(|e| NotifyError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn send_ticket_email(&self, address: &str, details: &TicketDetails) -> Result<(), NotifyError> {
        let mailer = self.email.as_ref().ok_or(NotifyError::Disabled("email"))?;
        mailer
            .send(address, &format!("Your ticket {}", details.ticket_number), ticket_email_html(details))
            .await
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let gateway = self.sms.as_ref().ok_or(NotifyError::Disabled("sms"))?;
        gateway.send(&[to.to_string()], body).await
    }

    async fn send_bulk_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifyError> {
        let gateway = self.sms.as_ref().ok_or(NotifyError::Disabled("sms"))?;
        gateway.send(recipients, body).await
    }
}

struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| NotifyError::Delivery(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", config.from_name, config.from_address),
        })
    }

    async fn send(&self, to: &str, subject: &str, html_body: String) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::Delivery(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifyError::Delivery(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| NotifyError::Delivery(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Delivery(format!("Failed to send email: {e}")))?;
        debug!(to = %Masked(to), "Email sent");
        Ok(())
    }
}

fn ticket_email_html(d: &TicketDetails) -> String {
    let seat = d.seat.as_deref().unwrap_or("To be assigned");
    format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Your ticket</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #2563eb;">Ticket {number}</h2>
        <table style="border-collapse: collapse;">
            <tr><td style="padding: 4px 12px 4px 0;">From</td><td>{origin}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;">To</td><td>{destination}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;">Bus</td><td>{bus}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;">Seat</td><td>{seat}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;">Status</td><td>{status}</td></tr>
        </table>
        <p style="color: #666; font-size: 14px;">Please present this ticket number when boarding.</p>
    </div>
</body>
</html>
"#,
        number = escape_html(&d.ticket_number),
        origin = escape_html(&d.origin),
        destination = escape_html(&d.destination),
        bus = escape_html(&d.bus),
        seat = escape_html(seat),
        status = d.status,
    )
}

/// Route, bus and seat names are operator-entered text.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    sender: &'a str,
    message: &'a str,
    recipients: &'a [String],
}

struct SmsGateway {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender: String,
}

impl SmsGateway {
    fn new(config: &SmsConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Delivery(format!("SMS client error: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            sender: config.sender_id.clone(),
        })
    }

    async fn send(&self, recipients: &[String], message: &str) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&SmsRequest { sender: &self.sender, message, recipients })
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("SMS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("SMS gateway returned {status}: {body}")));
        }
        debug!(recipients = recipients.len(), "SMS sent");
        Ok(())
    }
}
