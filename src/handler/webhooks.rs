// handler/webhooks.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};

use crate::{
    error::HttpError,
    service::error::ServiceError,
    AppState,
};

pub fn webhooks_handler() -> Router {
    Router::new().route("/razorpay", post(razorpay_webhook))
}

/// `(order_id, payment_id)` of a `payment.captured` event.
fn captured_payment(event: &serde_json::Value) -> Option<(String, String)> {
    if event["event"].as_str()? != "payment.captured" {
        return None;
    }
    let entity = &event["payload"]["payment"]["entity"];
    let payment_id = entity["id"].as_str()?.to_string();
    let order_id = entity["order_id"].as_str()?.to_string();
    Some((order_id, payment_id))
}

/// Outcomes the provider should not retry.
fn is_settled_outcome(error: &ServiceError) -> bool {
    matches!(
        error,
        ServiceError::NotFound(_) | ServiceError::StaleState(_) | ServiceError::Conflict(_)
    )
}

pub async fn razorpay_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get("x-razorpay-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| HttpError::bad_request("Missing or invalid Razorpay signature"))?;

    if !app_state.gateway.verify_webhook_signature(&body, signature) {
        tracing::warn!("Invalid Razorpay webhook signature received");
        return Err(HttpError::unauthorized("Invalid webhook signature"));
    }

    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| HttpError::bad_request("Webhook payload is not valid JSON"))?;

    let (order_id, payment_id) = match captured_payment(&event) {
        Some(ids) => ids,
        None => {
            tracing::info!(
                "Unhandled Razorpay webhook event: {}",
                event["event"].as_str().unwrap_or("unknown")
            );
            return Ok(Json(serde_json::json!({ "status": "ignored" })));
        }
    };

    match app_state
        .booking_service
        .confirm_captured_order(&order_id, &payment_id)
        .await
    {
        Ok(Some(booking)) => {
            tracing::info!(booking_id = %booking.id, order_id = %order_id, "Booking confirmed from webhook");
            return Ok(Json(serde_json::json!({ "status": "success" })));
        }
        Ok(None) => {}
        Err(e) if is_settled_outcome(&e) => {
            tracing::info!(order_id = %order_id, "Webhook capture left to the client: {}", e);
            return Ok(Json(serde_json::json!({ "status": "ignored" })));
        }
        Err(e) => return Err(e.into()),
    }

    match app_state
        .wallet_service
        .settle_recharge(None, &order_id, &payment_id, None)
        .await
    {
        Ok((payment, _)) => {
            tracing::info!(payment_id = %payment.id, order_id = %order_id, "Recharge settled from webhook");
            Ok(Json(serde_json::json!({ "status": "success" })))
        }
        Err(e) if is_settled_outcome(&e) => {
            tracing::info!(order_id = %order_id, "No pending order for captured payment: {}", e);
            Ok(Json(serde_json::json!({ "status": "ignored" })))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn captured_event_yields_provider_ids() {
        let event = serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_29QQoUBi66xm2f",
                "order_id": "order_9A33XWu170gUtm",
                "amount": 50000
            }}}
        });
        assert_eq!(
            captured_payment(&event),
            Some(("order_9A33XWu170gUtm".to_string(), "pay_29QQoUBi66xm2f".to_string()))
        );
    }

    #[test]
    fn other_events_are_ignored() {
        let failed = serde_json::json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_1" }}}
        });
        assert_eq!(captured_payment(&failed), None);

        let no_order = serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": null }}}
        });
        assert_eq!(captured_payment(&no_order), None);
    }

    #[test]
    fn replays_and_unknown_orders_are_not_retried() {
        assert!(is_settled_outcome(&ServiceError::not_found("Recharge order")));
        assert!(is_settled_outcome(&ServiceError::stale("Payment order is no longer payable")));
        assert!(is_settled_outcome(&ServiceError::Conflict("already completed".into())));
        assert!(!is_settled_outcome(&ServiceError::AssignmentConflict(Uuid::nil())));
        assert!(!is_settled_outcome(&ServiceError::Internal("pool".into())));
    }
}
