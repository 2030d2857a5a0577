pub mod bookingdtos;
pub mod subscriptiondtos;
pub mod walletdtos;
pub mod workerdtos;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::HttpError,
    service::booking_service::{GatewayProof, PaymentChoice},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            ((total as f64) / (limit as f64)).ceil() as u32
        };
        Self {
            success: true,
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RequestQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

impl RequestQueryDto {
    pub fn page_and_limit(&self) -> (u32, usize) {
        (self.page.unwrap_or(1), self.limit.unwrap_or(10))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodDto {
    Wallet,
    Razorpay,
}

/// Provider ids returned by the gateway checkout. All three or none.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentProofDto {
    #[validate(length(min = 1, max = 100))]
    pub razorpay_order_id: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub razorpay_payment_id: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub razorpay_signature: Option<String>,
}

impl PaymentProofDto {
    pub fn into_proof(self) -> Result<Option<GatewayProof>, HttpError> {
        match (self.razorpay_order_id, self.razorpay_payment_id, self.razorpay_signature) {
            (Some(order_id), Some(payment_id), Some(signature)) => Ok(Some(GatewayProof {
                order_id,
                payment_id,
                signature,
            })),
            (None, None, None) => Ok(None),
            _ => Err(HttpError::bad_request(
                "razorpay_order_id, razorpay_payment_id and razorpay_signature must be sent together",
            )),
        }
    }
}

/// Wallet pays now; gateway with proof settles now; gateway without proof defers.
pub fn payment_choice(method: PaymentMethodDto, proof: PaymentProofDto) -> Result<PaymentChoice, HttpError> {
    match (method, proof.into_proof()?) {
        (PaymentMethodDto::Wallet, None) => Ok(PaymentChoice::Wallet),
        (PaymentMethodDto::Wallet, Some(_)) => Err(HttpError::bad_request(
            "Gateway payment details are not accepted for wallet payments",
        )),
        (PaymentMethodDto::Razorpay, Some(proof)) => Ok(PaymentChoice::Gateway(proof)),
        (PaymentMethodDto::Razorpay, None) => Ok(PaymentChoice::Deferred),
    }
}

pub fn validation_error(errors: validator::ValidationErrors) -> HttpError {
    HttpError::bad_request(errors.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(order: Option<&str>, payment: Option<&str>, sig: Option<&str>) -> PaymentProofDto {
        PaymentProofDto {
            razorpay_order_id: order.map(String::from),
            razorpay_payment_id: payment.map(String::from),
            razorpay_signature: sig.map(String::from),
        }
    }

    #[test]
    fn payment_choice_follows_method_and_proof() {
        assert!(matches!(
            payment_choice(PaymentMethodDto::Wallet, proof(None, None, None)),
            Ok(PaymentChoice::Wallet)
        ));
        assert!(matches!(
            payment_choice(PaymentMethodDto::Razorpay, proof(None, None, None)),
            Ok(PaymentChoice::Deferred)
        ));
        assert!(matches!(
            payment_choice(PaymentMethodDto::Razorpay, proof(Some("order_1"), Some("pay_1"), Some("sig"))),
            Ok(PaymentChoice::Gateway(_))
        ));
        assert!(payment_choice(PaymentMethodDto::Razorpay, proof(Some("order_1"), None, None)).is_err());
        assert!(payment_choice(PaymentMethodDto::Wallet, proof(Some("o"), Some("p"), Some("s"))).is_err());
    }

    #[test]
    fn total_pages_round_up() {
        let page: PaginatedResponse<u8> = PaginatedResponse::new(vec![], 21, 1, 10);
        assert_eq!(page.total_pages, 3);
        let empty: PaginatedResponse<u8> = PaginatedResponse::new(vec![], 0, 1, 10);
        assert_eq!(empty.total_pages, 0);
    }
}
