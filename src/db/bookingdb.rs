// db/bookingdb.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{types::Json, Error};
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::bookingmodel::{Booking, BookingAddress, BookingStatus, BookingType};
use crate::models::paymentmodel::PaymentStatus;

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_reference: String,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub time_slot_id: Option<Uuid>,
    pub booking_type: BookingType,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub address: BookingAddress,
    pub description: Option<String>,
    pub contact_person: String,
    pub contact_phone: String,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub booking_type: Option<BookingType>,
    pub service_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[async_trait]
pub trait BookingExt {
    async fn insert_booking_tx(&self, tx: &mut PgTx<'_>, booking: NewBooking) -> Result<Booking, Error>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, Error>;

    async fn lock_booking_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Option<Booking>, Error>;

    /// Writes every mutable column of `booking`, guarded by `status = expected`.
    /// `None` means another writer moved the booking first.
    async fn update_booking_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<Option<Booking>, Error>;

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<Booking>, i64), Error>;

    /// Soft delete, terminal bookings only.
    async fn soft_delete_booking(&self, booking_id: Uuid) -> Result<bool, Error>;

    async fn expired_hold_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, Error>;

    async fn expired_quote_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, Error>;

    async fn overdue_in_progress_ids(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, Error>;
}

#[async_trait]
impl BookingExt for DBClient {
    async fn insert_booking_tx(&self, tx: &mut PgTx<'_>, booking: NewBooking) -> Result<Booking, Error> {
        sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings
            (booking_reference, user_id, service_id, time_slot_id, booking_type, status,
             payment_status, scheduled_date, scheduled_time, scheduled_end_time, hold_expires_at,
             address, description, contact_person, contact_phone, special_instructions)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(booking.booking_reference)
        .bind(booking.user_id)
        .bind(booking.service_id)
        .bind(booking.time_slot_id)
        .bind(booking.booking_type)
        .bind(booking.status)
        .bind(booking.payment_status)
        .bind(booking.scheduled_date)
        .bind(booking.scheduled_time)
        .bind(booking.scheduled_end_time)
        .bind(booking.hold_expires_at)
        .bind(Json(booking.address))
        .bind(booking.description)
        .bind(booking.contact_person)
        .bind(booking.contact_phone)
        .bind(booking.special_instructions)
        .fetch_one(&mut **tx)
        .await
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, Error> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn lock_booking_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Option<Booking>, Error> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn update_booking_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<Option<Booking>, Error> {
        sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $3,
                payment_status = $4,
                time_slot_id = $5,
                scheduled_date = $6,
                scheduled_time = $7,
                scheduled_end_time = $8,
                actual_start_time = $9,
                actual_end_time = $10,
                actual_duration_minutes = $11,
                hold_expires_at = $12,
                quote_amount = $13,
                quote_notes = $14,
                quote_provided_by = $15,
                quote_provided_at = $16,
                quote_accepted_at = $17,
                quote_expires_at = $18,
                rejection_reason = $19,
                cancellation_reason = $20,
                cancelled_by = $21,
                cancelled_at = $22,
                completion_type = $23,
                updated_at = NOW()
            WHERE id = $1 AND status = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(expected)
        .bind(booking.status)
        .bind(booking.payment_status)
        .bind(booking.time_slot_id)
        .bind(booking.scheduled_date)
        .bind(booking.scheduled_time)
        .bind(booking.scheduled_end_time)
        .bind(booking.actual_start_time)
        .bind(booking.actual_end_time)
        .bind(booking.actual_duration_minutes)
        .bind(booking.hold_expires_at)
        .bind(booking.quote_amount)
        .bind(&booking.quote_notes)
        .bind(booking.quote_provided_by)
        .bind(booking.quote_provided_at)
        .bind(booking.quote_accepted_at)
        .bind(booking.quote_expires_at)
        .bind(&booking.rejection_reason)
        .bind(&booking.cancellation_reason)
        .bind(booking.cancelled_by)
        .bind(booking.cancelled_at)
        .bind(booking.completion_type)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<Booking>, i64), Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE deleted_at IS NULL
              AND ($1::uuid IS NULL OR user_id = $1)
              AND ($2::booking_status IS NULL OR status = $2)
              AND ($3::booking_type IS NULL OR booking_type = $3)
              AND ($4::uuid IS NULL OR service_id = $4)
              AND ($5::date IS NULL OR scheduled_date >= $5)
              AND ($6::date IS NULL OR scheduled_date <= $6)
            ORDER BY created_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(filter.booking_type)
        .bind(filter.service_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE deleted_at IS NULL
              AND ($1::uuid IS NULL OR user_id = $1)
              AND ($2::booking_status IS NULL OR status = $2)
              AND ($3::booking_type IS NULL OR booking_type = $3)
              AND ($4::uuid IS NULL OR service_id = $4)
              AND ($5::date IS NULL OR scheduled_date >= $5)
              AND ($6::date IS NULL OR scheduled_date <= $6)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(filter.booking_type)
        .bind(filter.service_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.pool)
        .await?;

        Ok((bookings, total))
    }

    async fn soft_delete_booking(&self, booking_id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND deleted_at IS NULL
              AND status IN ('completed', 'cancelled', 'rejected', 'expired')
            "#,
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expired_hold_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, Error> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE status IN ('pending', 'temporary_hold')
              AND hold_expires_at IS NOT NULL
              AND hold_expires_at < $1
              AND deleted_at IS NULL
            ORDER BY hold_expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn expired_quote_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, Error> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE status = 'quote_provided'
              AND quote_expires_at IS NOT NULL
              AND quote_expires_at < $1
              AND deleted_at IS NULL
            ORDER BY quote_expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn overdue_in_progress_ids(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, Error> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE status = 'in_progress'
              AND scheduled_end_time IS NOT NULL
              AND scheduled_end_time < $1
              AND deleted_at IS NULL
            ORDER BY scheduled_end_time ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
