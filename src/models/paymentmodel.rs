// models/paymentmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Hold,
    Completed,
    Failed,
    Refunded,
    RefundPending,
    Abandoned,
    Expired,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Booking,
    Subscription,
    WalletRecharge,
    WalletDebit,
    Refund,
    SegmentPay,
    Quote,
    Manual,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Razorpay,
    Wallet,
    Cash,
    Admin,
}

/// Free-form details kept alongside a payment row.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PaymentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_payment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_refund_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub payment_reference: String,
    pub user_id: Uuid,
    pub amount: i64, // in paise
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub razorpay_signature: Option<String>,
    pub balance_after: Option<i64>,
    pub refunded_amount: i64,
    pub refund_attempts: i32,
    pub refund_reason: Option<String>,
    pub metadata: Option<Json<PaymentMetadata>>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn refundable_amount(&self) -> i64 {
        (self.amount - self.refunded_amount).max(0)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, PaymentStatus::Completed | PaymentStatus::Hold)
    }
}

/// Typed handle for `related_entity_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedEntity {
    Booking,
    Subscription,
    Wallet,
    Payment,
}

impl RelatedEntity {
    pub fn to_str(&self) -> &'static str {
        match self {
            RelatedEntity::Booking => "booking",
            RelatedEntity::Subscription => "subscription",
            RelatedEntity::Wallet => "wallet",
            RelatedEntity::Payment => "payment",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "wallet_transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    Recharge,
    ServicePayment,
    Refund,
    AdminAdjustment,
    Subscription,
}

impl WalletTransactionType {
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            WalletTransactionType::Recharge
                | WalletTransactionType::Refund
                | WalletTransactionType::AdminAdjustment
        )
    }

    pub fn signed(&self, amount: i64) -> i64 {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "wallet_transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: WalletTransactionType,
    pub status: WalletTransactionStatus,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_id: String,
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn signed_amount(&self) -> i64 {
        self.transaction_type.signed(self.amount)
    }
}

/// Replays a ledger in order and checks that every `balance_after` follows
/// from the previous one. Returns the final balance.
pub fn replay_ledger(transactions: &[WalletTransaction]) -> Result<i64, String> {
    let mut balance = 0i64;
    for txn in transactions
        .iter()
        .filter(|t| t.status == WalletTransactionStatus::Completed)
    {
        balance += txn.signed_amount();
        if balance < 0 {
            return Err(format!("ledger went negative at {}", txn.reference_id));
        }
        if balance != txn.balance_after {
            return Err(format!(
                "balance_after mismatch at {}: expected {}, recorded {}",
                txn.reference_id, balance, txn.balance_after
            ));
        }
    }
    Ok(balance)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "segment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PaymentSegment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub segment_number: i32,
    pub amount: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub status: SegmentStatus,
    pub payment_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSegment {
    /// Overdue is derived at read time and never written back.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SegmentStatus {
        match self.status {
            SegmentStatus::Pending if self.due_date.map(|d| d < now).unwrap_or(false) => {
                SegmentStatus::Overdue
            }
            status => status,
        }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self.status, SegmentStatus::Pending | SegmentStatus::Overdue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn txn(kind: WalletTransactionType, amount: i64, balance_after: i64, reference: &str) -> WalletTransaction {
        WalletTransaction {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            transaction_type: kind,
            status: WalletTransactionStatus::Completed,
            amount,
            balance_after,
            reference_id: reference.to_string(),
            payment_id: None,
            booking_id: None,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn credit_and_debit_signs() {
        assert_eq!(WalletTransactionType::Recharge.signed(500), 500);
        assert_eq!(WalletTransactionType::Refund.signed(500), 500);
        assert_eq!(WalletTransactionType::ServicePayment.signed(500), -500);
        assert_eq!(WalletTransactionType::Subscription.signed(500), -500);
    }

    #[test]
    fn replay_matches_recorded_balances() {
        let ledger = vec![
            txn(WalletTransactionType::Recharge, 150_000, 150_000, "a"),
            txn(WalletTransactionType::ServicePayment, 100_000, 50_000, "b"),
            txn(WalletTransactionType::Refund, 10_000, 60_000, "c"),
        ];
        assert_eq!(replay_ledger(&ledger), Ok(60_000));
    }

    #[test]
    fn replay_detects_divergence() {
        let ledger = vec![
            txn(WalletTransactionType::Recharge, 150_000, 150_000, "a"),
            txn(WalletTransactionType::ServicePayment, 100_000, 60_000, "b"),
        ];
        assert!(replay_ledger(&ledger).unwrap_err().contains("mismatch at b"));
    }

    #[test]
    fn replay_detects_negative_balance() {
        let ledger = vec![txn(WalletTransactionType::ServicePayment, 100, -100, "x")];
        assert!(replay_ledger(&ledger).is_err());
    }

    #[test]
    fn pending_segment_past_due_reads_overdue() {
        let now = Utc::now();
        let segment = PaymentSegment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            segment_number: 1,
            amount: 1000,
            due_date: Some(now - Duration::days(1)),
            status: SegmentStatus::Pending,
            payment_id: None,
            paid_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(segment.effective_status(now), SegmentStatus::Overdue);
        assert!(segment.is_payable());

        let paid = PaymentSegment { status: SegmentStatus::Paid, ..segment };
        assert_eq!(paid.effective_status(now), SegmentStatus::Paid);
        assert!(!paid.is_payable());
    }
}
