use serde::{Deserialize, Serialize};

use crate::records::AttendeeRecord;

/// Events pushed to viewers over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RoomEvent {
    /// Full attendee snapshot, sent to a freshly joined connection only
    InitialData { attendees: Vec<AttendeeRecord> },

    /// The event's current image changed (or is delivered as part of a snapshot)
    ImageUpdated { image_url: Option<String> },

    /// A single attendee row changed (check-in or car plate)
    AttendeeUpdated { record: AttendeeRecord },

    /// The whole event was reset back to pending
    DataReset { attendees: Vec<AttendeeRecord> },

    /// Live viewer count for one event's room
    EventUserCountUpdate { event_id: i64, count: usize },

    /// Process-wide connected viewer count
    UserCountUpdate { count: usize },
}

/// Commands sent FROM client TO server over the WebSocket.
/// Disconnecting is the socket closing, not a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Subscribe to one event's room
    JoinEvent { event_id: i64 },

    /// Unsubscribe from one event's room
    LeaveEvent { event_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_camel_case_wire_names() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"joinEvent","data":{"eventId":7}}"#).unwrap();
        match cmd {
            ClientCommand::JoinEvent { event_id } => assert_eq!(event_id, 7),
            other => panic!("expected JoinEvent, got {other:?}"),
        }
    }

    #[test]
    fn count_updates_serialize_tagged() {
        let json = serde_json::to_string(&RoomEvent::EventUserCountUpdate {
            event_id: 2,
            count: 5,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"eventUserCountUpdate","data":{"eventId":2,"count":5}}"#
        );

        let json = serde_json::to_string(&RoomEvent::UserCountUpdate { count: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"userCountUpdate","data":{"count":3}}"#);
    }
}
