use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use muster_types::api::{CarPlateRequest, CheckInRequest, RegisterAttendeeRequest};

use crate::error::ApiError;
use crate::{AppState, service};

pub async fn check_in(
    State(state): State<AppState>,
    Path(attendee_id): Path<i64>,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = service::check_in(&state, attendee_id, &req.status).await?;
    Ok(Json(record))
}

pub async fn set_car_plate(
    State(state): State<AppState>,
    Path(attendee_id): Path<i64>,
    Json(req): Json<CarPlateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = service::set_car_plate(&state, attendee_id, &req.car_plate).await?;
    Ok(Json(record))
}

pub async fn list(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let attendees = service::list_attendees(&state, event_id).await?;
    Ok(Json(attendees))
}

pub async fn register(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<RegisterAttendeeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = service::register_attendee(
        &state,
        event_id,
        req.name,
        req.dependents,
        &req.relation,
        req.is_leader,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}
