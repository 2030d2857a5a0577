// service/payment_gateway.rs
use std::future::Future;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{config::Config, service::error::ServiceError};

type HmacSha256 = Hmac<Sha256>;

const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRefund {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// Razorpay adapter. Order creation and refunds go over HTTP; signature
/// checks are pure so callers can run them while holding row locks.
#[derive(Debug, Clone)]
pub struct RazorpayService {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl RazorpayService {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            webhook_secret: config.razorpay_webhook_secret.clone(),
            base_url: config.razorpay_base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
        attempts: u32,
    ) -> Result<ProviderOrder, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidInput("Order amount must be positive".to_string()));
        }

        let payload = serde_json::json!({
            "amount": amount,
            "currency": currency,
            "receipt": receipt,
            "notes": notes,
        });
        let url = format!("{}/orders", self.base_url);

        let order: ProviderOrder = with_retry(attempts, || self.post_json(&url, &payload)).await?;
        tracing::info!(order_id = %order.id, amount, "Razorpay order created");
        Ok(order)
    }

    pub async fn refund(
        &self,
        razorpay_payment_id: &str,
        amount: i64,
        reason: &str,
        attempts: u32,
    ) -> Result<ProviderRefund, ServiceError> {
        let payload = serde_json::json!({
            "amount": amount,
            "notes": { "reason": reason },
        });
        let url = format!("{}/payments/{}/refund", self.base_url, razorpay_payment_id);

        let refund: ProviderRefund = with_retry(attempts, || self.post_json(&url, &payload)).await?;
        tracing::info!(refund_id = %refund.id, payment_id = razorpay_payment_id, amount, "Razorpay refund issued");
        Ok(refund)
    }

    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.key_secret, order_id, payment_id, signature)
    }

    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        if self.webhook_secret.is_empty() || signature.is_empty() {
            return false;
        }
        let expected = hmac_hex(&self.webhook_secret, body);
        ConstantTimeEq::ct_eq(signature.as_bytes(), expected.as_bytes()).into()
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(payload)
            .send()
            .await
            .map_err(|e| ServiceError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let description = body["error"]["description"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            return Err(ServiceError::ProviderUnavailable(format!("{}: {}", status, description)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ProviderUnavailable(format!("malformed provider response: {}", e)))
    }
}

fn hmac_hex(secret: &str, message: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// HMAC-SHA256 over `order_id|payment_id`, compared in constant time.
/// Any empty input is a failed verification.
pub fn verify_payment_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    if secret.is_empty() || order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
        return false;
    }

    let payload = format!("{}|{}", order_id, payment_id);
    let expected = hmac_hex(secret, payload.as_bytes());

    ConstantTimeEq::ct_eq(signature.as_bytes(), expected.as_bytes()).into()
}

/// Runs `op` up to `attempts` times, sleeping 200ms, 400ms, ... between
/// failures. Only `ProviderUnavailable` is retried.
pub async fn with_retry<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(ServiceError::ProviderUnavailable(reason)) if attempt < attempts => {
                let backoff = BASE_BACKOFF_MS * (1u64 << (attempt - 1));
                tracing::warn!(attempt, backoff_ms = backoff, "Payment provider call failed: {}", reason);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        hmac_hex(secret, format!("{}|{}", order_id, payment_id).as_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let signature = sign("s3cret", "order_Abc", "pay_Xyz");
        assert!(verify_payment_signature("s3cret", "order_Abc", "pay_Xyz", &signature));
    }

    #[test]
    fn rejects_tampered_inputs() {
        let signature = sign("s3cret", "order_Abc", "pay_Xyz");
        assert!(!verify_payment_signature("s3cret", "order_Abc", "pay_Other", &signature));
        assert!(!verify_payment_signature("other", "order_Abc", "pay_Xyz", &signature));
        assert!(!verify_payment_signature("s3cret", "order_Abc", "pay_Xyz", "deadbeef"));
    }

    #[test]
    fn rejects_empty_inputs() {
        let signature = sign("s3cret", "order_Abc", "pay_Xyz");
        assert!(!verify_payment_signature("s3cret", "", "pay_Xyz", &signature));
        assert!(!verify_payment_signature("s3cret", "order_Abc", "", &signature));
        assert!(!verify_payment_signature("s3cret", "order_Abc", "pay_Xyz", ""));
        assert!(!verify_payment_signature("", "order_Abc", "pay_Xyz", &signature));
    }

    #[tokio::test]
    async fn retry_stops_after_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ServiceError::ProviderUnavailable("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::ProviderUnavailable("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(ServiceError::ProviderUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_provider_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::SignatureInvalid) }
        })
        .await;
        assert!(matches!(result, Err(ServiceError::SignatureInvalid)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
