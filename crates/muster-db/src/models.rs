//! Database row types — these map directly to SQLite rows.
//! Distinct from the muster-types API records to keep the DB layer
//! independent; `into_record` converts at the boundary.

use chrono::{DateTime, Utc};
use muster_types::records::{
    AttendeeRecord, AttendeeStatus, EventRecord, EventStatus, Relation, StatsRecord,
};
use tracing::warn;

pub struct EventRow {
    pub id: i64,
    pub name: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub status: String,
    pub created_at: String,
}

pub struct AttendeeRow {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub dependents: i64,
    pub relation: String,
    pub status: String,
    pub car_plate: String,
    pub total: i64,
    pub is_leader: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Joined from the owning event for display.
    pub event_name: String,
    pub event_date: String,
}

pub struct StatsRow {
    pub registrations: i64,
    pub total_people: i64,
    pub checked_in_people: i64,
    pub pending_people: i64,
    pub car_plates: i64,
}

impl EventRow {
    pub fn into_record(self) -> EventRecord {
        EventRecord {
            id: self.id,
            status: self.status.parse().unwrap_or_else(|e| {
                warn!("Corrupt status on event {}: {}", self.id, e);
                EventStatus::Active
            }),
            created_at: parse_sqlite_timestamp(&self.created_at, self.id, "created_at"),
            name: self.name,
            date: self.date,
            time: self.time,
            location: self.location,
        }
    }
}

impl AttendeeRow {
    pub fn into_record(self) -> AttendeeRecord {
        AttendeeRecord {
            id: self.id,
            event_id: self.event_id,
            relation: self.relation.parse().unwrap_or_else(|e| {
                warn!("Corrupt relation on attendee {}: {}", self.id, e);
                Relation::Member
            }),
            status: self.status.parse().unwrap_or_else(|e| {
                warn!("Corrupt status on attendee {}: {}", self.id, e);
                AttendeeStatus::Pending
            }),
            created_at: parse_sqlite_timestamp(&self.created_at, self.id, "created_at"),
            updated_at: parse_sqlite_timestamp(&self.updated_at, self.id, "updated_at"),
            name: self.name,
            dependents: self.dependents,
            car_plate: self.car_plate,
            total: self.total,
            is_leader: self.is_leader,
            event_name: self.event_name,
            event_date: self.event_date,
        }
    }
}

impl StatsRow {
    pub fn into_record(self) -> StatsRecord {
        StatsRecord {
            registrations: self.registrations,
            total_people: self.total_people,
            checked_in_people: self.checked_in_people,
            pending_people: self.pending_people,
            car_plates: self.car_plates,
        }
    }
}

fn parse_sqlite_timestamp(raw: &str, row_id: i64, field: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on row {}: {}", field, raw, row_id, e);
            DateTime::default()
        })
}
