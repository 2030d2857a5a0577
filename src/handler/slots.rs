// handler/slots.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    dtos::{
        bookingdtos::{parse_date, SlotQueryDto, TimeSlotDto},
        ApiResponse,
    },
    error::HttpError,
    AppState,
};

pub fn slots_handler() -> Router {
    Router::new().route("/:service_id/slots", get(list_available_slots))
}

pub async fn list_available_slots(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(service_id): Path<Uuid>,
    Query(query): Query<SlotQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let date = parse_date(&query.date)?;

    let slots = app_state
        .slot_service
        .list_available(service_id, date, Utc::now().date_naive())
        .await?;

    let data: Vec<TimeSlotDto> = slots.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success("Available slots retrieved", data)))
}
