// dtos/walletdtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::paymentmodel::{WalletTransaction, WalletTransactionStatus, WalletTransactionType},
    service::wallet_service::{LedgerReport, WalletSummary},
    utils::currency::paise_to_rupees,
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RechargeOrderDto {
    #[validate(range(min = 0.01, message = "Amount must be positive"))]
    pub amount: f64,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRechargeDto {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletSummaryDto {
    pub balance: f64,
    pub limit: f64,
    pub headroom: f64,
    pub currency: String,
}

impl From<WalletSummary> for WalletSummaryDto {
    fn from(s: WalletSummary) -> Self {
        WalletSummaryDto {
            balance: paise_to_rupees(s.balance),
            limit: paise_to_rupees(s.limit),
            headroom: paise_to_rupees(s.headroom),
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletTransactionDto {
    pub id: Uuid,
    pub transaction_type: WalletTransactionType,
    pub status: WalletTransactionStatus,
    pub amount: f64,
    pub balance_after: f64,
    pub reference_id: String,
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionDto {
    fn from(t: WalletTransaction) -> Self {
        WalletTransactionDto {
            id: t.id,
            transaction_type: t.transaction_type,
            status: t.status,
            amount: paise_to_rupees(t.amount),
            balance_after: paise_to_rupees(t.balance_after),
            reference_id: t.reference_id,
            payment_id: t.payment_id,
            booking_id: t.booking_id,
            description: t.description,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RechargeResultDto {
    pub payment_id: Uuid,
    pub payment_reference: String,
    pub amount: f64,
    pub balance_after: Option<f64>,
    pub transaction: Option<WalletTransactionDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerReportDto {
    pub user_id: Uuid,
    pub recorded_balance: f64,
    pub ledger_balance: Option<f64>,
    pub transaction_count: usize,
    pub consistent: bool,
    pub problem: Option<String>,
}

impl From<LedgerReport> for LedgerReportDto {
    fn from(r: LedgerReport) -> Self {
        LedgerReportDto {
            user_id: r.user_id,
            recorded_balance: paise_to_rupees(r.recorded_balance),
            ledger_balance: r.ledger_balance.map(paise_to_rupees),
            transaction_count: r.transaction_count,
            consistent: r.consistent,
            problem: r.problem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_rendered_in_rupees() {
        let dto: WalletSummaryDto = WalletSummary {
            user_id: Uuid::nil(),
            balance: 150_050,
            limit: 10_000_000,
            headroom: 9_849_950,
        }
        .into();
        assert_eq!(dto.balance, 1500.5);
        assert_eq!(dto.limit, 100_000.0);
        assert_eq!(dto.headroom, 98_499.5);
    }

    #[test]
    fn recharge_amount_must_be_positive() {
        assert!(RechargeOrderDto { amount: 0.0 }.validate().is_err());
        assert!(RechargeOrderDto { amount: 500.0 }.validate().is_ok());
    }
}
