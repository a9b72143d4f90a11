use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check-in state of a single attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendeeStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "checked-in")]
    CheckedIn,
}

impl AttendeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CheckedIn => "checked-in",
        }
    }
}

impl FromStr for AttendeeStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "checked-in" => Ok(Self::CheckedIn),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

impl fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a registration relates to the member roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    /// The registered member themselves.
    #[serde(rename = "self")]
    Member,
    #[serde(rename = "dependent")]
    Dependent,
    #[serde(rename = "guest")]
    Guest,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "self",
            Self::Dependent => "dependent",
            Self::Guest => "guest",
        }
    }
}

impl FromStr for Relation {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(Self::Member),
            "dependent" => Ok(Self::Dependent),
            "guest" => Ok(Self::Guest),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "closed")]
    Closed,
}

impl FromStr for EventStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// An enumerated wire value the server does not recognize.
#[derive(Debug, Clone)]
pub struct UnknownValue(pub String);

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized value '{}'", self.0)
    }
}

impl std::error::Error for UnknownValue {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: i64,
    pub name: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// The canonical attendee row as read back from the store after a write.
/// This (never the request payload) is what gets broadcast to rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRecord {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub dependents: i64,
    pub relation: Relation,
    pub status: AttendeeStatus,
    pub car_plate: String,
    pub total: i64,
    pub is_leader: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Display fields joined from the owning event.
    pub event_name: String,
    pub event_date: String,
}

/// Derived per-event aggregate; read-only, never broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    /// Distinct registrations (rows).
    pub registrations: i64,
    /// Sum of headcounts over all registrations.
    pub total_people: i64,
    /// Headcount already checked in.
    pub checked_in_people: i64,
    /// Headcount still pending.
    pub pending_people: i64,
    /// Registrations with a non-empty car plate.
    pub car_plates: i64,
}
