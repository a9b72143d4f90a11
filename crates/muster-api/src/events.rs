use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use muster_types::api::{CreateEventRequest, ResetResponse};

use crate::error::ApiError;
use crate::{AppState, service};

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let events = service::list_events(&state).await?;
    Ok(Json(events))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = service::create_event(&state, req.name, req.date, req.time, req.location).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let attendees = service::reset_event(&state, event_id).await?;
    Ok(Json(ResetResponse {
        success: true,
        attendees,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = service::stats(&state, event_id).await?;
    Ok(Json(stats))
}
