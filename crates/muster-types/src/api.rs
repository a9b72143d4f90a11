use serde::{Deserialize, Serialize};

use crate::records::AttendeeRecord;

// -- Attendee mutations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInRequest {
    /// Raw enumerated value; validated by the mutation service so that
    /// unknown values surface as 400, not a deserialize error.
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CarPlateRequest {
    /// Opaque text; empty clears the plate.
    pub car_plate: String,
}

// -- Event image --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SetImageRequest {
    pub image_data: String,
}

#[derive(Debug, Serialize)]
pub struct SetImageResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_url: Option<String>,
}

// -- Reset --

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub attendees: Vec<AttendeeRecord>,
}

// -- Roster administration --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RegisterAttendeeRequest {
    pub name: String,
    #[serde(default)]
    pub dependents: i64,
    /// Raw enumerated value; validated by the mutation service.
    pub relation: String,
    #[serde(default)]
    pub is_leader: bool,
}

// -- Event administration --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    pub name: String,
    pub date: String,
    pub time: String,
    pub location: String,
}
