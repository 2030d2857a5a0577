// service/wallet_service.rs
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{
        db::{DBClient, PgTx},
        paymentdb::{NewPayment, PaymentExt},
        userdb::UserExt,
        walletdb::{WalletEntry, WalletExt},
    },
    models::paymentmodel::{
        replay_ledger, Payment, PaymentMetadata, PaymentMethod, PaymentStatus, PaymentType,
        RelatedEntity, WalletTransaction, WalletTransactionType,
    },
    service::{
        admin_config::{AdminConfigService, BookingConfig},
        error::ServiceError,
        payment_gateway::{ProviderOrder, RazorpayService},
    },
    utils::reference::{payment_reference, wallet_reference},
};

#[derive(Debug, Clone)]
pub struct DebitPurpose {
    pub transaction_type: WalletTransactionType,
    pub payment_type: PaymentType,
    pub related: Option<(RelatedEntity, Uuid)>,
    pub booking_id: Option<Uuid>,
    pub description: String,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundDisposition {
    Credited { amount: i64 },
    Deferred { amount: i64 },
    Nothing,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub user_id: Uuid,
    pub balance: i64,
    pub limit: i64,
    pub headroom: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub user_id: Uuid,
    pub recorded_balance: i64,
    pub ledger_balance: Option<i64>,
    pub transaction_count: usize,
    pub consistent: bool,
    pub problem: Option<String>,
}

pub fn check_recharge_bounds(amount: i64, config: &BookingConfig) -> Result<(), ServiceError> {
    if amount < config.min_recharge_amount || amount > config.max_recharge_amount {
        return Err(ServiceError::AmountOutOfRange {
            min: config.min_recharge_amount,
            max: config.max_recharge_amount,
        });
    }
    Ok(())
}

pub fn credited_balance(balance: i64, amount: i64, limit: i64) -> Result<i64, ServiceError> {
    let next = balance
        .checked_add(amount)
        .ok_or(ServiceError::LimitExceeded { limit })?;
    if next > limit {
        return Err(ServiceError::LimitExceeded { limit });
    }
    Ok(next)
}

pub fn debited_balance(balance: i64, amount: i64) -> Result<i64, ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::InvalidInput("Debit amount must be positive".to_string()));
    }
    if balance < amount {
        return Err(ServiceError::InsufficientFunds {
            required: amount,
            available: balance,
        });
    }
    Ok(balance - amount)
}

#[derive(Debug, Clone)]
pub struct WalletService {
    db_client: Arc<DBClient>,
    gateway: Arc<RazorpayService>,
    config_service: AdminConfigService,
}

impl WalletService {
    pub fn new(db_client: Arc<DBClient>, gateway: Arc<RazorpayService>) -> Self {
        let config_service = AdminConfigService::new(db_client.clone());
        Self {
            db_client,
            gateway,
            config_service,
        }
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<WalletSummary, ServiceError> {
        let user = self
            .db_client
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        Ok(WalletSummary {
            user_id,
            balance: user.wallet_balance,
            limit: user.wallet_limit,
            headroom: user.wallet_headroom(),
        })
    }

    pub async fn transactions(
        &self,
        user_id: Uuid,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<WalletTransaction>, i64), ServiceError> {
        Ok(self.db_client.list_wallet_transactions(user_id, page, limit).await?)
    }

    pub async fn create_recharge_order(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<(Payment, ProviderOrder), ServiceError> {
        let config = self.config_service.load().await?;
        check_recharge_bounds(amount, &config)?;

        let user = self
            .db_client
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        credited_balance(user.wallet_balance, amount, user.wallet_limit)?;

        let reference = payment_reference();
        let order = self
            .gateway
            .create_order(
                amount,
                "INR",
                &reference,
                serde_json::json!({ "purpose": "wallet_recharge", "user_id": user_id }),
                config.provider_retry_attempts,
            )
            .await?;

        let mut tx = self.db_client.begin_tx().await?;
        let payment = self
            .db_client
            .insert_payment_tx(
                &mut tx,
                NewPayment {
                    payment_reference: reference,
                    user_id,
                    amount,
                    status: PaymentStatus::Pending,
                    payment_type: PaymentType::WalletRecharge,
                    method: PaymentMethod::Razorpay,
                    related_entity: Some((RelatedEntity::Wallet, user_id)),
                    razorpay_order_id: Some(order.id.clone()),
                    razorpay_payment_id: None,
                    razorpay_signature: None,
                    balance_after: None,
                    metadata: PaymentMetadata {
                        description: Some("Wallet recharge".to_string()),
                        ..Default::default()
                    },
                },
            )
            .await?;
        tx.commit().await?;

        Ok((payment, order))
    }

    pub async fn complete_recharge(
        &self,
        user_id: Uuid,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        razorpay_signature: &str,
    ) -> Result<(Payment, Option<WalletTransaction>), ServiceError> {
        if !self
            .gateway
            .verify_signature(razorpay_order_id, razorpay_payment_id, razorpay_signature)
        {
            tracing::warn!(user_id = %user_id, order_id = razorpay_order_id, "Recharge signature rejected");
            return Err(ServiceError::SignatureInvalid);
        }

        self.settle_recharge(Some(user_id), razorpay_order_id, razorpay_payment_id, Some(razorpay_signature))
            .await
    }

    /// Credits a pending recharge order. `owner` is checked when the caller
    /// is a user; the webhook path passes `None`.
    pub async fn settle_recharge(
        &self,
        owner: Option<Uuid>,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        razorpay_signature: Option<&str>,
    ) -> Result<(Payment, Option<WalletTransaction>), ServiceError> {
        let config = self.config_service.load().await?;
        let mut tx = self.db_client.begin_tx().await?;

        let payment = self
            .db_client
            .find_payment_by_order_tx(&mut tx, razorpay_order_id)
            .await?
            .filter(|p| owner.map(|o| o == p.user_id).unwrap_or(true))
            .filter(|p| p.payment_type == PaymentType::WalletRecharge)
            .ok_or_else(|| ServiceError::not_found("Recharge order"))?;
        let user_id = payment.user_id;

        if payment.status == PaymentStatus::Completed {
            if payment.razorpay_payment_id.as_deref() == Some(razorpay_payment_id) {
                return Ok((payment, None));
            }
            return Err(ServiceError::Conflict(
                "Recharge order was already completed with a different payment".to_string(),
            ));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(ServiceError::stale("Recharge order is no longer payable"));
        }
        check_recharge_bounds(payment.amount, &config)?;

        let user = self
            .db_client
            .lock_user_tx(&mut tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let balance_after = credited_balance(user.wallet_balance, payment.amount, user.wallet_limit)?;

        let payment = self
            .db_client
            .complete_payment_tx(
                &mut tx,
                payment.id,
                Some(razorpay_payment_id),
                razorpay_signature,
                Some(balance_after),
            )
            .await?;

        let entry = self
            .db_client
            .append_wallet_entry_tx(
                &mut tx,
                WalletEntry {
                    user_id,
                    transaction_type: WalletTransactionType::Recharge,
                    amount: payment.amount,
                    balance_after,
                    reference_id: wallet_reference("rc"),
                    payment_id: Some(payment.id),
                    booking_id: None,
                    description: "Wallet recharge".to_string(),
                },
            )
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, amount = payment.amount, balance_after, "Wallet recharged");
        Ok((payment, Some(entry)))
    }

    pub async fn debit_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        amount: i64,
        purpose: DebitPurpose,
    ) -> Result<(Payment, WalletTransaction), ServiceError> {
        let user = self
            .db_client
            .lock_user_tx(tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let balance_after = debited_balance(user.wallet_balance, amount)?;

        let payment = self
            .db_client
            .insert_payment_tx(
                tx,
                NewPayment {
                    payment_reference: payment_reference(),
                    user_id,
                    amount,
                    status: PaymentStatus::Completed,
                    payment_type: purpose.payment_type,
                    method: PaymentMethod::Wallet,
                    related_entity: purpose.related,
                    razorpay_order_id: None,
                    razorpay_payment_id: None,
                    razorpay_signature: None,
                    balance_after: Some(balance_after),
                    metadata: purpose.metadata,
                },
            )
            .await?;

        let entry = self
            .db_client
            .append_wallet_entry_tx(
                tx,
                WalletEntry {
                    user_id,
                    transaction_type: purpose.transaction_type,
                    amount,
                    balance_after,
                    reference_id: wallet_reference("db"),
                    payment_id: Some(payment.id),
                    booking_id: purpose.booking_id,
                    description: purpose.description,
                },
            )
            .await?;

        tracing::info!(user_id = %user_id, amount, balance_after, "Wallet debited");
        Ok((payment, entry))
    }

    /// Credits `amount` of `original` back to its owner's wallet. Capped at
    /// what is still refundable; `LimitExceeded` leaves nothing written.
    pub async fn refund_to_wallet_tx(
        &self,
        tx: &mut PgTx<'_>,
        original: &Payment,
        amount: i64,
        booking_id: Option<Uuid>,
        reason: &str,
    ) -> Result<WalletTransaction, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidInput("Refund amount must be positive".to_string()));
        }
        if amount > original.refundable_amount() {
            return Err(ServiceError::RefundExceedsOriginal {
                requested: amount,
                refundable: original.refundable_amount(),
            });
        }

        let user = self
            .db_client
            .lock_user_tx(tx, original.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let balance_after = credited_balance(user.wallet_balance, amount, user.wallet_limit)?;

        let refund_payment = self
            .db_client
            .insert_payment_tx(
                tx,
                NewPayment {
                    payment_reference: payment_reference(),
                    user_id: original.user_id,
                    amount,
                    status: PaymentStatus::Completed,
                    payment_type: PaymentType::Refund,
                    method: PaymentMethod::Wallet,
                    related_entity: Some((RelatedEntity::Payment, original.id)),
                    razorpay_order_id: None,
                    razorpay_payment_id: None,
                    razorpay_signature: None,
                    balance_after: Some(balance_after),
                    metadata: PaymentMetadata {
                        description: Some(reason.to_string()),
                        original_payment_id: Some(original.id),
                        ..Default::default()
                    },
                },
            )
            .await?;

        let entry = self
            .db_client
            .append_wallet_entry_tx(
                tx,
                WalletEntry {
                    user_id: original.user_id,
                    transaction_type: WalletTransactionType::Refund,
                    amount,
                    balance_after,
                    reference_id: wallet_reference("rf"),
                    payment_id: Some(refund_payment.id),
                    booking_id,
                    description: reason.to_string(),
                },
            )
            .await?;

        let fully_refunded = original.refunded_amount + amount >= original.amount;
        let status = if fully_refunded {
            PaymentStatus::Refunded
        } else {
            original.status
        };
        self.db_client
            .record_refund_tx(tx, original.id, amount, status, reason)
            .await?;

        tracing::info!(
            user_id = %original.user_id,
            payment_id = %original.id,
            amount,
            balance_after,
            "Refund credited to wallet"
        );
        Ok(entry)
    }

    /// Settled payments go back to the wallet, or to `refund_pending` when the
    /// limit blocks the credit. Unsettled ones are closed with `unsettled_status`.
    pub async fn refund_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment: &Payment,
        amount: i64,
        booking_id: Option<Uuid>,
        reason: &str,
        unsettled_status: PaymentStatus,
    ) -> Result<RefundDisposition, ServiceError> {
        match payment.status {
            PaymentStatus::Pending => {
                self.db_client
                    .set_payment_status_tx(tx, payment.id, unsettled_status)
                    .await?;
                return Ok(RefundDisposition::Nothing);
            }
            PaymentStatus::Completed | PaymentStatus::Hold => {}
            _ => return Ok(RefundDisposition::Nothing),
        }

        let amount = amount.min(payment.refundable_amount());
        if amount <= 0 {
            return Ok(RefundDisposition::Nothing);
        }

        match self.refund_to_wallet_tx(tx, payment, amount, booking_id, reason).await {
            Ok(_) => Ok(RefundDisposition::Credited { amount }),
            Err(ServiceError::LimitExceeded { limit }) => {
                let note = format!("wallet limit {} reached", limit);
                self.db_client
                    .mark_refund_pending_tx(tx, payment.id, reason, &note)
                    .await?;
                tracing::warn!(payment_id = %payment.id, amount, "Refund deferred: {}", note);
                Ok(RefundDisposition::Deferred { amount })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn retry_pending_refund(&self, payment_id: Uuid) -> Result<RefundDisposition, ServiceError> {
        let config = self.config_service.load().await?;
        let mut tx = self.db_client.begin_tx().await?;

        let payment = match self.db_client.lock_payment_tx(&mut tx, payment_id).await? {
            Some(p) if p.status == PaymentStatus::RefundPending => p,
            _ => return Ok(RefundDisposition::Nothing),
        };
        let amount = payment.refundable_amount();
        if amount <= 0 {
            self.db_client
                .set_payment_status_tx(&mut tx, payment.id, PaymentStatus::Refunded)
                .await?;
            tx.commit().await?;
            return Ok(RefundDisposition::Nothing);
        }
        let reason = payment
            .refund_reason
            .clone()
            .unwrap_or_else(|| "Refund".to_string());

        match self.refund_to_wallet_tx(&mut tx, &payment, amount, None, &reason).await {
            Ok(_) => {
                tx.commit().await?;
                return Ok(RefundDisposition::Credited { amount });
            }
            Err(ServiceError::LimitExceeded { .. }) => {
                tx.rollback().await?;
            }
            Err(e) => {
                tx.rollback().await?;
                self.db_client.bump_refund_attempts(payment.id, &e.to_string()).await?;
                return Err(e);
            }
        }

        // Wallet is full: send gateway payments back to source instead.
        let provider_payment_id = match (payment.method, payment.razorpay_payment_id.as_deref()) {
            (PaymentMethod::Razorpay, Some(id)) => id.to_string(),
            _ => {
                self.db_client
                    .bump_refund_attempts(payment.id, "wallet limit reached")
                    .await?;
                return Ok(RefundDisposition::Deferred { amount });
            }
        };

        let refund = match self
            .gateway
            .refund(&provider_payment_id, amount, &reason, config.provider_retry_attempts)
            .await
        {
            Ok(refund) => refund,
            Err(e) => {
                self.db_client.bump_refund_attempts(payment.id, &e.to_string()).await?;
                return Ok(RefundDisposition::Deferred { amount });
            }
        };

        let mut tx = self.db_client.begin_tx().await?;
        self.db_client
            .insert_payment_tx(
                &mut tx,
                NewPayment {
                    payment_reference: payment_reference(),
                    user_id: payment.user_id,
                    amount,
                    status: PaymentStatus::Completed,
                    payment_type: PaymentType::Refund,
                    method: PaymentMethod::Razorpay,
                    related_entity: Some((RelatedEntity::Payment, payment.id)),
                    razorpay_order_id: None,
                    razorpay_payment_id: None,
                    razorpay_signature: None,
                    balance_after: None,
                    metadata: PaymentMetadata {
                        description: Some(reason.clone()),
                        original_payment_id: Some(payment.id),
                        provider_refund_id: Some(refund.id.clone()),
                        ..Default::default()
                    },
                },
            )
            .await?;
        self.db_client
            .record_refund_tx(&mut tx, payment.id, amount, PaymentStatus::Refunded, &reason)
            .await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment.id, refund_id = %refund.id, amount, "Refund returned to source");
        Ok(RefundDisposition::Credited { amount })
    }

    /// Replays the user's ledger against `users.wallet_balance`.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<LedgerReport, ServiceError> {
        let user = self
            .db_client
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let ledger = self.db_client.wallet_ledger(user_id).await?;

        let (ledger_balance, problem) = match replay_ledger(&ledger) {
            Ok(balance) if balance == user.wallet_balance => (Some(balance), None),
            Ok(balance) => (
                Some(balance),
                Some(format!(
                    "ledger sums to {} but wallet_balance is {}",
                    balance, user.wallet_balance
                )),
            ),
            Err(e) => (None, Some(e)),
        };

        if let Some(problem) = &problem {
            tracing::error!(user_id = %user_id, "Wallet ledger divergence: {}", problem);
        }

        Ok(LedgerReport {
            user_id,
            recorded_balance: user.wallet_balance,
            ledger_balance,
            transaction_count: ledger.len(),
            consistent: problem.is_none(),
            problem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recharge_bounds() {
        let config = BookingConfig::default();
        assert!(check_recharge_bounds(150_000, &config).is_ok());
        assert!(matches!(
            check_recharge_bounds(5_000, &config),
            Err(ServiceError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            check_recharge_bounds(config.max_recharge_amount + 1, &config),
            Err(ServiceError::AmountOutOfRange { .. })
        ));
    }

    #[test]
    fn credit_respects_limit() {
        assert_eq!(credited_balance(0, 150_000, 10_000_000).unwrap(), 150_000);
        assert_eq!(credited_balance(9_990_000, 10_000, 10_000_000).unwrap(), 10_000_000);
        assert!(matches!(
            credited_balance(9_990_000, 10_001, 10_000_000),
            Err(ServiceError::LimitExceeded { limit: 10_000_000 })
        ));
        assert!(credited_balance(i64::MAX, 1, i64::MAX).is_err());
    }

    #[test]
    fn debit_requires_funds() {
        assert_eq!(debited_balance(150_000, 100_000).unwrap(), 50_000);
        assert_eq!(debited_balance(100_000, 100_000).unwrap(), 0);
        assert!(matches!(
            debited_balance(50_000, 100_000),
            Err(ServiceError::InsufficientFunds { required: 100_000, available: 50_000 })
        ));
        assert!(debited_balance(50_000, 0).is_err());
    }

    #[test]
    fn recharge_then_debit_is_neutral() {
        let after_recharge = credited_balance(20_000, 50_000, 10_000_000).unwrap();
        assert_eq!(debited_balance(after_recharge, 50_000).unwrap(), 20_000);
    }
}
