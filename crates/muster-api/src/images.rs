use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use muster_types::api::{ImageResponse, SetImageRequest, SetImageResponse};

use crate::error::ApiError;
use crate::{AppState, service};

pub async fn get(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let image_url = service::get_image(&state, event_id).await?;
    Ok(Json(ImageResponse { image_url }))
}

pub async fn set(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<SetImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    service::set_event_image(&state, event_id, req.image_data).await?;
    Ok(Json(SetImageResponse { success: true }))
}
