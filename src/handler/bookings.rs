// handler/bookings.rs
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
    db::bookingdb::BookingFilter,
    dtos::{
        bookingdtos::*, payment_choice, validation_error, ApiResponse, PaginatedResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    service::booking_service::GatewayProof,
    AppState,
};

pub fn bookings_handler() -> Router {
    Router::new()
        .route("/", post(create_booking).get(list_my_bookings))
        .route("/inquiry", post(create_inquiry))
        .route("/:booking_id", get(get_booking))
        .route("/:booking_id/verify-payment", post(verify_payment))
        .route("/:booking_id/payment-order", post(create_payment_order))
        .route("/:booking_id/cancel", post(cancel_booking))
        .route("/:booking_id/quote/accept", post(accept_quote))
        .route("/:booking_id/quote/reject", post(reject_quote))
        .route("/:booking_id/quote/schedule", post(schedule_booking))
        .route("/:booking_id/segments", get(get_segments))
        .route("/:booking_id/segments/:segment_number/pay", post(pay_segment))
}

pub async fn create_booking(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateBookingDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let input = body.into_input()?;

    let outcome = app_state
        .booking_service
        .create_booking(&auth.principal, input)
        .await?;

    let message = if outcome.order.is_some() {
        "Booking is on hold until payment is confirmed"
    } else {
        "Booking created successfully"
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            message,
            BookingCreatedDto::new(outcome, app_state.gateway.key_id()),
        )),
    ))
}

pub async fn create_inquiry(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateInquiryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let input = body.into_input()?;

    let outcome = app_state
        .booking_service
        .create_inquiry(&auth.principal, input)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Inquiry submitted successfully",
            BookingCreatedDto::new(outcome, app_state.gateway.key_id()),
        )),
    ))
}

pub async fn list_my_bookings(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<BookingListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate().map_err(validation_error)?;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(10);

    let filter = BookingFilter {
        user_id: Some(auth.principal.user_id),
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

pub async fn get_booking(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let detail = app_state
        .booking_service
        .get_booking_detail(&auth.principal, booking_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Booking retrieved successfully",
        BookingDetailDto::from(detail),
    )))
}

pub async fn verify_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<VerifyPaymentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let booking = app_state
        .booking_service
        .verify_payment(
            &auth.principal,
            booking_id,
            GatewayProof {
                order_id: body.razorpay_order_id,
                payment_id: body.razorpay_payment_id,
                signature: body.razorpay_signature,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(
        "Payment verified successfully",
        BookingResponseDto::from(booking),
    )))
}

pub async fn create_payment_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<PaymentOrderDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let (payment, order) = app_state
        .booking_service
        .create_payment_order(&auth.principal, booking_id, body.segment_number)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Payment order created",
            PaymentOrderResponseDto {
                payment: payment.into(),
                order: ProviderOrderDto::new(order, app_state.gateway.key_id()),
            },
        )),
    ))
}

pub async fn cancel_booking(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<ReasonDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let booking = app_state
        .booking_service
        .cancel_booking(&auth.principal, booking_id, body.reason)
        .await?;

    Ok(Json(ApiResponse::success(
        "Booking cancelled successfully",
        BookingResponseDto::from(booking),
    )))
}

pub async fn accept_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<ScheduleDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate().map_err(validation_error)?;
    let schedule = body.into_schedule()?;

    let booking = app_state
        .booking_service
        .accept_quote(&auth.principal, booking_id, schedule)
        .await?;

    Ok(Json(ApiResponse::success(
        "Quote accepted successfully",
        BookingResponseDto::from(booking),
    )))
}

pub async fn reject_quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<ReasonDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let booking = app_state
        .booking_service
        .reject_quote(&auth.principal, booking_id, body.reason)
        .await?;

    Ok(Json(ApiResponse::success(
        "Quote rejected",
        BookingResponseDto::from(booking),
    )))
}

pub async fn schedule_booking(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<ScheduleDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let schedule = body
        .into_schedule()?
        .ok_or_else(|| HttpError::bad_request("scheduled_date and scheduled_time are required"))?;

    let booking = app_state
        .booking_service
        .schedule_booking(&auth.principal, booking_id, schedule)
        .await?;

    Ok(Json(ApiResponse::success(
        "Booking scheduled successfully",
        BookingResponseDto::from(booking),
    )))
}

pub async fn get_segments(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let progress = app_state
        .segment_service
        .progress(&auth.principal, booking_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Payment progress retrieved",
        SegmentProgressDto::from(progress),
    )))
}

pub async fn pay_segment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((booking_id, segment_number)): Path<(Uuid, i32)>,
    Json(body): Json<PaySegmentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let choice = payment_choice(body.payment_method, body.proof)?;

    let progress = app_state
        .segment_service
        .pay_segment(&auth.principal, booking_id, segment_number, choice)
        .await?;

    Ok(Json(ApiResponse::success(
        "Segment paid successfully",
        SegmentProgressDto::from(progress),
    )))
}
