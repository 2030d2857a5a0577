// db/paymentdb.rs
use async_trait::async_trait;
use sqlx::{types::Json, Error};
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::paymentmodel::{
    Payment, PaymentMetadata, PaymentMethod, PaymentStatus, PaymentType, RelatedEntity,
};

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_reference: String,
    pub user_id: Uuid,
    pub amount: i64,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub related_entity: Option<(RelatedEntity, Uuid)>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    pub balance_after: Option<i64>,
    pub metadata: PaymentMetadata,
}

#[async_trait]
pub trait PaymentExt {
    async fn insert_payment_tx(&self, tx: &mut PgTx<'_>, payment: NewPayment) -> Result<Payment, Error>;

    async fn lock_payment_tx(&self, tx: &mut PgTx<'_>, payment_id: Uuid) -> Result<Option<Payment>, Error>;

    async fn find_payment_by_order_tx(
        &self,
        tx: &mut PgTx<'_>,
        razorpay_order_id: &str,
    ) -> Result<Option<Payment>, Error>;

    /// Non-refund payments attached to an entity, oldest first.
    async fn payments_for_entity_tx(
        &self,
        tx: &mut PgTx<'_>,
        entity: RelatedEntity,
        entity_id: Uuid,
    ) -> Result<Vec<Payment>, Error>;

    async fn complete_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        razorpay_payment_id: Option<&str>,
        razorpay_signature: Option<&str>,
        balance_after: Option<i64>,
    ) -> Result<Payment, Error>;

    async fn set_payment_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Payment, Error>;

    /// Adds `amount` to `refunded_amount` and moves the payment to `status`.
    async fn record_refund_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        amount: i64,
        status: PaymentStatus,
        reason: &str,
    ) -> Result<Payment, Error>;

    async fn mark_refund_pending_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        reason: &str,
        last_error: &str,
    ) -> Result<Payment, Error>;

    async fn refund_pending_payments(&self, max_attempts: i32, limit: i64) -> Result<Vec<Payment>, Error>;

    async fn bump_refund_attempts(&self, payment_id: Uuid, last_error: &str) -> Result<(), Error>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn insert_payment_tx(&self, tx: &mut PgTx<'_>, payment: NewPayment) -> Result<Payment, Error> {
        let (entity_type, entity_id) = match payment.related_entity {
            Some((entity, id)) => (Some(entity.to_str()), Some(id)),
            None => (None, None),
        };
        let completed = payment.status == PaymentStatus::Completed;

        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments
            (payment_reference, user_id, amount, currency, status, payment_type, method,
             related_entity_type, related_entity_id, razorpay_order_id, razorpay_payment_id,
             razorpay_signature, balance_after, metadata, completed_at)
            VALUES ($1, $2, $3, 'INR', $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    CASE WHEN $14 THEN NOW() ELSE NULL END)
            RETURNING *
            "#,
        )
        .bind(payment.payment_reference)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.status)
        .bind(payment.payment_type)
        .bind(payment.method)
        .bind(entity_type)
        .bind(entity_id)
        .bind(payment.razorpay_order_id)
        .bind(payment.razorpay_payment_id)
        .bind(payment.razorpay_signature)
        .bind(payment.balance_after)
        .bind(Json(payment.metadata))
        .bind(completed)
        .fetch_one(&mut **tx)
        .await
    }

    async fn lock_payment_tx(&self, tx: &mut PgTx<'_>, payment_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_optional(&mut **tx)
            .await
    }

    async fn find_payment_by_order_tx(
        &self,
        tx: &mut PgTx<'_>,
        razorpay_order_id: &str,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE razorpay_order_id = $1 AND payment_type <> 'refund'
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(razorpay_order_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn payments_for_entity_tx(
        &self,
        tx: &mut PgTx<'_>,
        entity: RelatedEntity,
        entity_id: Uuid,
    ) -> Result<Vec<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE related_entity_type = $1
              AND related_entity_id = $2
              AND payment_type <> 'refund'
            ORDER BY created_at ASC
            FOR UPDATE
            "#,
        )
        .bind(entity.to_str())
        .bind(entity_id)
        .fetch_all(&mut **tx)
        .await
    }

    async fn complete_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        razorpay_payment_id: Option<&str>,
        razorpay_signature: Option<&str>,
        balance_after: Option<i64>,
    ) -> Result<Payment, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'completed',
                razorpay_payment_id = COALESCE($2, razorpay_payment_id),
                razorpay_signature = COALESCE($3, razorpay_signature),
                balance_after = COALESCE($4, balance_after),
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(razorpay_payment_id)
        .bind(razorpay_signature)
        .bind(balance_after)
        .fetch_one(&mut **tx)
        .await
    }

    async fn set_payment_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Payment, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
    }

    async fn record_refund_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        amount: i64,
        status: PaymentStatus,
        reason: &str,
    ) -> Result<Payment, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET refunded_amount = refunded_amount + $2,
                status = $3,
                refund_reason = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(amount)
        .bind(status)
        .bind(reason)
        .fetch_one(&mut **tx)
        .await
    }

    async fn mark_refund_pending_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        reason: &str,
        last_error: &str,
    ) -> Result<Payment, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'refund_pending',
                refund_reason = $2,
                metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('last_error', $3::text),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(reason)
        .bind(last_error)
        .fetch_one(&mut **tx)
        .await
    }

    async fn refund_pending_payments(&self, max_attempts: i32, limit: i64) -> Result<Vec<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE status = 'refund_pending' AND refund_attempts < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn bump_refund_attempts(&self, payment_id: Uuid, last_error: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE payments
            SET refund_attempts = refund_attempts + 1,
                metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('last_error', $2::text),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
