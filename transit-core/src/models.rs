use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::UnknownVariant;

/// Enums persisted as text columns. Keeps `as_str`, `Display` and `FromStr`
/// in step with the serde names.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

/// Trip status. Transitions are governed by [`TripStatus::transition`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Available,
    Scheduled,
    Embarked,
    FullyBooked,
    EmbarkedNotToCapacity,
    Completed,
}

text_enum!(TripStatus, "trip status", {
    Available => "available",
    Scheduled => "scheduled",
    Embarked => "embarked",
    FullyBooked => "fully_booked",
    EmbarkedNotToCapacity => "embarked_not_to_capacity",
    Completed => "completed",
});

impl TripStatus {
    /// Tickets can no longer be deleted once a trip is in one of these states.
    pub fn has_departed(&self) -> bool {
        matches!(self, TripStatus::Embarked | TripStatus::Completed)
    }

    /// Still taking bookings against the seat ledger.
    pub fn is_pre_departure(&self) -> bool {
        matches!(self, TripStatus::Scheduled | TripStatus::Available)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    Reserved,
}

text_enum!(SeatState, "seat state", {
    Available => "available",
    Reserved => "reserved",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Confirmed,
    Cancelled,
}

text_enum!(TicketStatus, "ticket status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Online,
    Walkin,
}

text_enum!(TicketType, "ticket type", {
    Online => "online",
    Walkin => "walkin",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Active,
    OnDuty,
    Driving,
    OffDuty,
    Leave,
    Suspended,
    Terminated,
}

text_enum!(DriverStatus, "driver status", {
    Active => "active",
    OnDuty => "on_duty",
    Driving => "driving",
    OffDuty => "off_duty",
    Leave => "leave",
    Suspended => "suspended",
    Terminated => "terminated",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Staff,
    Admin,
    Driver,
}

text_enum!(UserRole, "user role", {
    Customer => "customer",
    Staff => "staff",
    Admin => "admin",
    Driver => "driver",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PointsKind {
    Award,
    Redeem,
}

text_enum!(PointsKind, "points kind", {
    Award => "award",
    Redeem => "redeem",
});

/// One scheduled run of a bus along a route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub trip_code: String,
    pub bus_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
    pub embark_time: DateTime<Utc>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub status: TripStatus,
    pub is_scheduled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A seat ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub trip_id: Uuid,
    pub seat_number: String,
    pub state: SeatState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub user_id: Uuid,
    pub recipient_name: Option<String>,
    pub recipient_relationship: Option<String>,
    pub trip_id: Uuid,
    pub stop_id: Option<Uuid>,
    pub preferred_seat: Option<String>,
    pub seat_number: Option<String>,
    pub is_paid: bool,
    pub status: TicketStatus,
    pub ticket_type: TicketType,
    pub is_confirmed: bool,
    pub is_picked: bool,
    pub served_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bus {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub bus_number: String,
    pub capacity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub driver_no: Option<String>,
    pub license_number: String,
    pub license_expiry: Option<NaiveDate>,
    pub status: DriverStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    /// Kilometres. Older rows may not carry one.
    pub distance: Option<f64>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub stop_name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub total_points: i64,
}

/// Rewards ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointsEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: PointsKind,
    pub points: i64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Read projection of a ticket joined with its trip, route, bus and holder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketSummary {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub trip_code: String,
    pub origin: String,
    pub destination: String,
    pub bus_number: String,
    pub passenger_name: String,
    pub passenger_email: Option<String>,
}

/// Filter for ticket listings. `search` is a case-insensitive substring match
/// over the ticket number plus route endpoints (per-user listings) or holder
/// name and email (global listings).
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub ticket_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub search: Option<String>,
}

impl TicketFilter {
    pub fn for_user(user_id: Uuid, search: Option<String>) -> Self {
        Self { ticket_id: None, user_id: Some(user_id), search: normalize_search(search) }
    }

    pub fn all(search: Option<String>) -> Self {
        Self { ticket_id: None, user_id: None, search: normalize_search(search) }
    }

    pub fn by_id(ticket_id: Uuid) -> Self {
        Self { ticket_id: Some(ticket_id), user_id: None, search: None }
    }

    /// In-process evaluation of the filter, mirroring the SQL `ILIKE` clauses.
    pub fn matches(&self, summary: &TicketSummary) -> bool {
        if let Some(id) = self.ticket_id {
            if summary.ticket.id != id {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if summary.ticket.user_id != user_id {
                return false;
            }
        }
        let Some(needle) = self.search.as_deref() else {
            return true;
        };
        let needle = needle.to_lowercase();
        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

        if contains(&summary.ticket.ticket_number) {
            return true;
        }
        if self.user_id.is_some() {
            contains(&summary.origin) || contains(&summary.destination)
        } else {
            contains(&summary.passenger_name)
                || summary.passenger_email.as_deref().map(contains).unwrap_or(false)
        }
    }
}

fn normalize_search(search: Option<String>) -> Option<String> {
    search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
