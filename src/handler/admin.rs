// handler/admin.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::bookingdb::BookingFilter,
    dtos::{
        bookingdtos::*,
        validation_error,
        walletdtos::LedgerReportDto,
        workerdtos::{AssignWorkerDto, AssignmentDto, NotesDto, ResolveBufferDto},
        ApiResponse, PaginatedResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn admin_handler() -> Router {
    Router::new()
        .route("/bookings", get(list_all_bookings))
        .route("/bookings/:booking_id", delete(delete_booking))
        .route("/bookings/:booking_id/quote", post(provide_quote).put(update_quote))
        .route("/bookings/:booking_id/reject", post(reject_inquiry))
        .route("/bookings/:booking_id/assign", post(assign_worker))
        .route("/bookings/:booking_id/complete", post(force_complete))
        .route("/bookings/:booking_id/segments", post(create_segments))
        .route("/buffer-requests/:request_id/approve", post(approve_buffer))
        .route("/buffer-requests/:request_id/reject", post(reject_buffer))
        .route("/wallet/:user_id/reconcile", get(reconcile_wallet))
}

pub async fn list_all_bookings(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<BookingListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate().map_err(validation_error)?;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(10);

    let filter = BookingFilter {
        user_id: None,
        status: query.status,
        booking_type: query.booking_type,
        service_id: query.service_id,
        date_from: query.date_from,
        date_to: query.date_to,
    };

    let (bookings, total) = app_state
        .booking_service
        .list_bookings(&auth.principal, filter, page, limit)
        .await?;

    let data: Vec<BookingResponseDto> = bookings.into_iter().map(Into::into).collect();
    Ok(Json(PaginatedResponse::new(data, total, page, limit as u32)))
}

pub async fn delete_booking(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.booking_service.soft_delete(booking_id).await?;

    Ok(Json(ApiResponse::success(
        "Booking deleted",
        serde_json::json!({ "booking_id": booking_id }),
    )))
}

pub async fn provide_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<ProvideQuoteDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let amount = amount_to_paise(body.amount)?;

    let booking = app_state
        .booking_service
        .provide_quote(&auth.principal, booking_id, amount, body.notes, body.expires_in_days)
        .await?;

    Ok(Json(ApiResponse::success(
        "Quote provided successfully",
        BookingResponseDto::from(booking),
    )))
}

pub async fn update_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<UpdateQuoteDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let amount = body.amount.map(amount_to_paise).transpose()?;

    let booking = app_state
        .booking_service
        .update_quote(&auth.principal, booking_id, amount, body.notes, body.expires_in_days)
        .await?;

    Ok(Json(ApiResponse::success(
        "Quote updated successfully",
        BookingResponseDto::from(booking),
    )))
}

pub async fn reject_inquiry(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<ReasonDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let booking = app_state
        .booking_service
        .reject_inquiry(&auth.principal, booking_id, body.reason)
        .await?;

    Ok(Json(ApiResponse::success(
        "Inquiry rejected",
        BookingResponseDto::from(booking),
    )))
}

pub async fn assign_worker(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<AssignWorkerDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let assignment = app_state
        .assignment_service
        .assign_worker(&auth.principal, booking_id, body.worker_id, body.notes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Worker assigned successfully",
            AssignmentDto::from(assignment),
        )),
    ))
}

pub async fn force_complete(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<NotesDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let assignment = app_state
        .assignment_service
        .force_complete(&auth.principal, booking_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success(
        "Booking completed by admin",
        AssignmentDto::from(assignment),
    )))
}

pub async fn create_segments(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<CreateSegmentsDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate_all().map_err(validation_error)?;
    let inputs = body.into_inputs()?;

    let segments = app_state
        .segment_service
        .create_segments(&auth.principal, booking_id, inputs)
        .await?;

    let now = Utc::now();
    let data: Vec<SegmentDto> = segments.into_iter().map(|s| SegmentDto::at(s, now)).collect();
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Payment segments created", data)),
    ))
}

pub async fn approve_buffer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    body: Option<Json<ResolveBufferDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let request = app_state
        .buffer_service
        .approve(&auth.principal, request_id, body.approved_minutes, body.notes)
        .await?;

    Ok(Json(ApiResponse::success("Buffer request approved", request)))
}

pub async fn reject_buffer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    body: Option<Json<ResolveBufferDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let request = app_state
        .buffer_service
        .reject(&auth.principal, request_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success("Buffer request rejected", request)))
}

pub async fn reconcile_wallet(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let report = app_state.wallet_service.reconcile(user_id).await?;

    let message = if report.consistent {
        "Wallet ledger is consistent"
    } else {
        "Wallet ledger diverges from the recorded balance"
    };
    Ok(Json(ApiResponse::success(message, LedgerReportDto::from(report))))
}
