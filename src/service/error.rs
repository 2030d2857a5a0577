use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{db::db::is_unique_violation, error::HttpError, utils::currency::paise_to_rupees};

fn rupees(paise: &i64) -> f64 {
    paise_to_rupees(*paise)
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Amount must be between ₹{min_rupees:.2} and ₹{max_rupees:.2}", min_rupees = rupees(.min), max_rupees = rupees(.max))]
    AmountOutOfRange { min: i64, max: i64 },

    #[error("Wallet limit of ₹{limit_rupees:.2} would be exceeded", limit_rupees = rupees(.limit))]
    LimitExceeded { limit: i64 },

    #[error("Refund of {requested} paise exceeds the refundable {refundable} paise")]
    RefundExceedsOriginal { requested: i64, refundable: i64 },

    #[error("Payment signature verification failed")]
    SignatureInvalid,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("The selected time slot has no remaining capacity")]
    NoCapacity,

    #[error("Booking {0} already has an active assignment")]
    AssignmentConflict(Uuid),

    #[error("Booking {0} already has a pending buffer request")]
    PendingBufferExists(Uuid),

    #[error("{0}")]
    StaleState(String),

    #[error("Insufficient wallet balance: required ₹{required_rupees:.2}, available ₹{available_rupees:.2}", required_rupees = rupees(.required), available_rupees = rupees(.available))]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self {
        ServiceError::NotFound(entity.to_string())
    }

    pub fn stale(message: impl Into<String>) -> Self {
        ServiceError::StaleState(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_)
            | ServiceError::AmountOutOfRange { .. }
            | ServiceError::LimitExceeded { .. }
            | ServiceError::RefundExceedsOriginal { .. }
            | ServiceError::SignatureInvalid => StatusCode::BAD_REQUEST,

            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::Conflict(_)
            | ServiceError::NoCapacity
            | ServiceError::AssignmentConflict(_)
            | ServiceError::PendingBufferExists(_)
            | ServiceError::StaleState(_) => StatusCode::CONFLICT,

            ServiceError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            ServiceError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,

            ServiceError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            ServiceError::Database(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::AmountOutOfRange { .. } => "amount_out_of_range",
            ServiceError::LimitExceeded { .. } => "limit_exceeded",
            ServiceError::RefundExceedsOriginal { .. } => "refund_exceeds_original",
            ServiceError::SignatureInvalid => "signature_invalid",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NoCapacity => "no_capacity",
            ServiceError::AssignmentConflict(_) => "assignment_conflict",
            ServiceError::PendingBufferExists(_) => "pending_buffer_exists",
            ServiceError::StaleState(_) => "stale_state",
            ServiceError::InsufficientFunds { .. } => "insufficient_funds",
            ServiceError::ProviderUnavailable(_) => "provider_unavailable",
            ServiceError::Database(e) if is_unique_violation(e) => "conflict",
            ServiceError::Database(_) | ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        let code = error.code();

        let message = match &error {
            ServiceError::Database(e) if is_unique_violation(e) => {
                "The record conflicts with an existing one".to_string()
            }
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                tracing::error!("Internal service error: {}", error);
                "Server Error. Please try again later".to_string()
            }
            _ => error.to_string(),
        };

        HttpError::with_code(message, status, code)
    }
}

impl From<String> for ServiceError {
    fn from(err: String) -> Self {
        ServiceError::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_stable_codes() {
        let cases = [
            (ServiceError::NoCapacity, StatusCode::CONFLICT, "no_capacity"),
            (
                ServiceError::InsufficientFunds { required: 100_000, available: 50_000 },
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_funds",
            ),
            (ServiceError::SignatureInvalid, StatusCode::BAD_REQUEST, "signature_invalid"),
            (
                ServiceError::ProviderUnavailable("timeout".into()),
                StatusCode::BAD_GATEWAY,
                "provider_unavailable",
            ),
            (ServiceError::stale("booking moved"), StatusCode::CONFLICT, "stale_state"),
            (
                ServiceError::PendingBufferExists(Uuid::nil()),
                StatusCode::CONFLICT,
                "pending_buffer_exists",
            ),
        ];

        for (error, status, code) in cases {
            let http: HttpError = error.into();
            assert_eq!(http.status, status);
            assert_eq!(http.code, code);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let http: HttpError = ServiceError::Internal("pool exhausted at 10.0.0.3".into()).into();
        assert_eq!(http.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http.code, "internal");
        assert!(!http.message.contains("10.0.0.3"));
    }

    #[test]
    fn money_is_rendered_in_rupees() {
        let err = ServiceError::AmountOutOfRange { min: 10_000, max: 5_000_000 };
        assert_eq!(err.to_string(), "Amount must be between ₹100.00 and ₹50000.00");
    }
}
