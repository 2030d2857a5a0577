// handler/subscriptions.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        bookingdtos::{PaymentOrderResponseDto, ProviderOrderDto},
        payment_choice,
        subscriptiondtos::*,
        validation_error, ApiResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn subscriptions_handler() -> Router {
    Router::new()
        .route("/", post(purchase_subscription))
        .route("/order", post(create_subscription_order))
        .route("/status", get(get_subscription_status))
        .route("/:subscription_id/cancel", post(cancel_subscription))
}

pub async fn create_subscription_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<SubscriptionOrderDto>,
) -> Result<impl IntoResponse, HttpError> {
    let (payment, order) = app_state
        .subscription_service
        .create_order(&auth.principal, body.plan_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Subscription order created",
            PaymentOrderResponseDto {
                payment: payment.into(),
                order: ProviderOrderDto::new(order, app_state.gateway.key_id()),
            },
        )),
    ))
}

pub async fn purchase_subscription(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<PurchaseSubscriptionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let choice = payment_choice(body.payment_method, body.proof)?;

    let subscription = app_state
        .subscription_service
        .purchase(&auth.principal, body.plan_id, choice)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Subscription activated",
            SubscriptionDto::from(subscription),
        )),
    ))
}

pub async fn get_subscription_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let overview = app_state.subscription_service.overview(&auth.principal).await?;

    Ok(Json(ApiResponse::success(
        "Subscription status retrieved",
        SubscriptionStatusDto::from(overview),
    )))
}

pub async fn cancel_subscription(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let subscription = app_state
        .subscription_service
        .cancel(&auth.principal, subscription_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Subscription cancelled",
        SubscriptionDto::from(subscription),
    )))
}
