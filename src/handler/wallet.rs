// handler/wallet.rs
use std::sync::Arc;

use axum::{
    extract::Query,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{
        bookingdtos::{amount_to_paise, PaymentResponseDto, ProviderOrderDto},
        validation_error,
        walletdtos::*,
        ApiResponse, PaginatedResponse, RequestQueryDto,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    utils::currency::paise_to_rupees,
    AppState,
};

pub fn wallet_handler() -> Router {
    Router::new()
        .route("/", get(get_wallet))
        .route("/recharge/order", post(create_recharge_order))
        .route("/recharge", post(complete_recharge))
        .route("/transactions", get(get_transactions))
}

pub async fn get_wallet(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state.wallet_service.summary(auth.principal.user_id).await?;

    Ok(Json(ApiResponse::success(
        "Wallet retrieved successfully",
        WalletSummaryDto::from(summary),
    )))
}

pub async fn create_recharge_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<RechargeOrderDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;
    let amount = amount_to_paise(body.amount)?;

    let (payment, order) = app_state
        .wallet_service
        .create_recharge_order(auth.principal.user_id, amount)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Recharge order created",
            serde_json::json!({
                "payment": PaymentResponseDto::from(payment),
                "order": ProviderOrderDto::new(order, app_state.gateway.key_id()),
            }),
        )),
    ))
}

pub async fn complete_recharge(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CompleteRechargeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let (payment, entry) = app_state
        .wallet_service
        .complete_recharge(
            auth.principal.user_id,
            &body.razorpay_order_id,
            &body.razorpay_payment_id,
            &body.razorpay_signature,
        )
        .await?;

    let message = if entry.is_some() {
        "Wallet recharged successfully"
    } else {
        "Recharge was already completed"
    };

    Ok(Json(ApiResponse::success(
        message,
        RechargeResultDto {
            payment_id: payment.id,
            payment_reference: payment.payment_reference,
            amount: paise_to_rupees(payment.amount),
            balance_after: payment.balance_after.map(paise_to_rupees),
            transaction: entry.map(Into::into),
        },
    )))
}

pub async fn get_transactions(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<RequestQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate().map_err(validation_error)?;
    let (page, limit) = query.page_and_limit();

    let (transactions, total) = app_state
        .wallet_service
        .transactions(auth.principal.user_id, page, limit)
        .await?;

    let data: Vec<WalletTransactionDto> = transactions.into_iter().map(Into::into).collect();
    Ok(Json(PaginatedResponse::new(data, total, page, limit as u32)))
}
