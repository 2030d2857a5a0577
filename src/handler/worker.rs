// handler/worker.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        validation_error,
        workerdtos::*,
        ApiResponse, PaginatedResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn worker_handler() -> Router {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/:assignment_id/accept", post(accept_assignment))
        .route("/assignments/:assignment_id/reject", post(reject_assignment))
        .route("/assignments/:assignment_id/start", post(start_assignment))
        .route("/assignments/:assignment_id/complete", post(complete_assignment))
        .route("/assignments/:assignment_id/location", get(get_location))
        .route("/bookings/:booking_id/buffer-request", post(request_buffer))
        .route("/location", post(update_location))
}

pub async fn list_assignments(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<AssignmentListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate().map_err(validation_error)?;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(10);

    let (assignments, total) = app_state
        .assignment_service
        .list_for_worker(&auth.principal, query.status, page, limit)
        .await?;

    let data: Vec<AssignmentDto> = assignments.into_iter().map(Into::into).collect();
    Ok(Json(PaginatedResponse::new(data, total, page, limit as u32)))
}

pub async fn accept_assignment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(assignment_id): Path<Uuid>,
    body: Option<Json<NotesDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let assignment = app_state
        .assignment_service
        .accept(&auth.principal, assignment_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success(
        "Assignment accepted",
        AssignmentDto::from(assignment),
    )))
}

pub async fn reject_assignment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(assignment_id): Path<Uuid>,
    Json(body): Json<RejectAssignmentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let assignment = app_state
        .assignment_service
        .reject(&auth.principal, assignment_id, body.reason, body.notes)
        .await?;

    Ok(Json(ApiResponse::success(
        "Assignment rejected",
        AssignmentDto::from(assignment),
    )))
}

pub async fn start_assignment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(assignment_id): Path<Uuid>,
    body: Option<Json<NotesDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let assignment = app_state
        .assignment_service
        .start(&auth.principal, assignment_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success(
        "Work started",
        AssignmentDto::from(assignment),
    )))
}

pub async fn complete_assignment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(assignment_id): Path<Uuid>,
    body: Option<Json<CompleteAssignmentDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate_all().map_err(validation_error)?;

    let assignment = app_state
        .assignment_service
        .complete(&auth.principal, assignment_id, body.into_report())
        .await?;

    Ok(Json(ApiResponse::success(
        "Work completed",
        AssignmentDto::from(assignment),
    )))
}

pub async fn request_buffer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<BufferRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let request = app_state
        .buffer_service
        .request_buffer(&auth.principal, booking_id, body.additional_minutes, body.reason)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Buffer request submitted", request)),
    ))
}

pub async fn update_location(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<LocationUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let location = app_state
        .location_service
        .update_location(
            &auth.principal,
            body.assignment_id,
            body.latitude,
            body.longitude,
            body.accuracy,
        )
        .await?;

    Ok(Json(ApiResponse::success(
        "Location updated",
        LocationDto::from(location),
    )))
}

pub async fn get_location(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(assignment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let location = app_state
        .location_service
        .current_location(&auth.principal, assignment_id)
        .await?
        .ok_or_else(|| HttpError::not_found("No active location for this assignment"))?;

    Ok(Json(ApiResponse::success(
        "Location retrieved",
        LocationDto::from(location),
    )))
}
