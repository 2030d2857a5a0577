// db/segmentdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::paymentmodel::PaymentSegment;

#[async_trait]
pub trait SegmentExt {
    async fn count_segments_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<i64, Error>;

    async fn insert_segment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        segment_number: i32,
        amount: i64,
        due_date: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<PaymentSegment, Error>;

    async fn segments_for_booking(&self, booking_id: Uuid) -> Result<Vec<PaymentSegment>, Error>;

    async fn segments_for_booking_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Vec<PaymentSegment>, Error>;

    async fn lock_segment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        segment_number: i32,
    ) -> Result<Option<PaymentSegment>, Error>;

    async fn mark_segment_paid_tx(
        &self,
        tx: &mut PgTx<'_>,
        segment_id: Uuid,
        payment_id: Uuid,
    ) -> Result<PaymentSegment, Error>;

    /// Pending (and read-time overdue) segments become cancelled; paid ones stay.
    async fn cancel_unpaid_segments_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<u64, Error>;
}

#[async_trait]
impl SegmentExt for DBClient {
    async fn count_segments_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM payment_segments WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_one(&mut **tx)
            .await
    }

    async fn insert_segment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        segment_number: i32,
        amount: i64,
        due_date: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<PaymentSegment, Error> {
        sqlx::query_as::<_, PaymentSegment>(
            r#"
            INSERT INTO payment_segments
            (booking_id, segment_number, amount, due_date, status, notes)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(segment_number)
        .bind(amount)
        .bind(due_date)
        .bind(notes)
        .fetch_one(&mut **tx)
        .await
    }

    async fn segments_for_booking(&self, booking_id: Uuid) -> Result<Vec<PaymentSegment>, Error> {
        sqlx::query_as::<_, PaymentSegment>(
            "SELECT * FROM payment_segments WHERE booking_id = $1 ORDER BY segment_number ASC",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn segments_for_booking_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Vec<PaymentSegment>, Error> {
        sqlx::query_as::<_, PaymentSegment>(
            "SELECT * FROM payment_segments WHERE booking_id = $1 ORDER BY segment_number ASC",
        )
        .bind(booking_id)
        .fetch_all(&mut **tx)
        .await
    }

    async fn lock_segment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        segment_number: i32,
    ) -> Result<Option<PaymentSegment>, Error> {
        sqlx::query_as::<_, PaymentSegment>(
            r#"
            SELECT * FROM payment_segments
            WHERE booking_id = $1 AND segment_number = $2
            FOR UPDATE
            "#,
        )
        .bind(booking_id)
        .bind(segment_number)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn mark_segment_paid_tx(
        &self,
        tx: &mut PgTx<'_>,
        segment_id: Uuid,
        payment_id: Uuid,
    ) -> Result<PaymentSegment, Error> {
        sqlx::query_as::<_, PaymentSegment>(
            r#"
            UPDATE payment_segments
            SET status = 'paid', payment_id = $2, paid_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(segment_id)
        .bind(payment_id)
        .fetch_one(&mut **tx)
        .await
    }

    async fn cancel_unpaid_segments_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE payment_segments
            SET status = 'cancelled', updated_at = NOW()
            WHERE booking_id = $1 AND status IN ('pending', 'overdue')
            "#,
        )
        .bind(booking_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
