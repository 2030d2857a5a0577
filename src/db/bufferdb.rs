// db/bufferdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::assignmentmodel::{BufferRequest, BufferRequestStatus};

#[async_trait]
pub trait BufferRequestExt {
    async fn insert_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        worker_id: Uuid,
        additional_minutes: i32,
        reason: &str,
    ) -> Result<BufferRequest, Error>;

    async fn pending_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
    ) -> Result<Option<BufferRequest>, Error>;

    async fn get_buffer_request(&self, request_id: Uuid) -> Result<Option<BufferRequest>, Error>;

    async fn lock_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        request_id: Uuid,
    ) -> Result<Option<BufferRequest>, Error>;

    /// Moves a pending request to `status`. `None` if it is no longer pending.
    async fn resolve_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        request_id: Uuid,
        status: BufferRequestStatus,
        admin_id: Uuid,
        approved_minutes: Option<i32>,
        admin_notes: Option<String>,
    ) -> Result<Option<BufferRequest>, Error>;

    async fn cancel_pending_buffer_requests_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<u64, Error>;

    async fn buffer_requests_for_booking(&self, booking_id: Uuid) -> Result<Vec<BufferRequest>, Error>;
}

#[async_trait]
impl BufferRequestExt for DBClient {
    async fn insert_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        worker_id: Uuid,
        additional_minutes: i32,
        reason: &str,
    ) -> Result<BufferRequest, Error> {
        sqlx::query_as::<_, BufferRequest>(
            r#"
            INSERT INTO buffer_requests
            (booking_id, worker_id, requested_additional_minutes, reason, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(worker_id)
        .bind(additional_minutes)
        .bind(reason)
        .fetch_one(&mut **tx)
        .await
    }

    async fn pending_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
    ) -> Result<Option<BufferRequest>, Error> {
        sqlx::query_as::<_, BufferRequest>(
            r#"
            SELECT * FROM buffer_requests
            WHERE booking_id = $1 AND status = 'pending' AND deleted_at IS NULL
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn get_buffer_request(&self, request_id: Uuid) -> Result<Option<BufferRequest>, Error> {
        sqlx::query_as::<_, BufferRequest>(
            "SELECT * FROM buffer_requests WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn lock_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        request_id: Uuid,
    ) -> Result<Option<BufferRequest>, Error> {
        sqlx::query_as::<_, BufferRequest>(
            "SELECT * FROM buffer_requests WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn resolve_buffer_request_tx(
        &self,
        tx: &mut PgTx<'_>,
        request_id: Uuid,
        status: BufferRequestStatus,
        admin_id: Uuid,
        approved_minutes: Option<i32>,
        admin_notes: Option<String>,
    ) -> Result<Option<BufferRequest>, Error> {
        sqlx::query_as::<_, BufferRequest>(
            r#"
            UPDATE buffer_requests
            SET status = $2,
                approved_by = CASE WHEN $2 = 'approved'::buffer_request_status THEN $3 ELSE approved_by END,
                approved_at = CASE WHEN $2 = 'approved'::buffer_request_status THEN NOW() ELSE approved_at END,
                rejected_at = CASE WHEN $2 = 'rejected'::buffer_request_status THEN NOW() ELSE rejected_at END,
                approved_minutes = $4,
                admin_notes = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(status)
        .bind(admin_id)
        .bind(approved_minutes)
        .bind(admin_notes)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn cancel_pending_buffer_requests_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE buffer_requests
            SET status = 'cancelled', updated_at = NOW()
            WHERE booking_id = $1 AND status = 'pending'
            "#,
        )
        .bind(booking_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn buffer_requests_for_booking(&self, booking_id: Uuid) -> Result<Vec<BufferRequest>, Error> {
        sqlx::query_as::<_, BufferRequest>(
            r#"
            SELECT * FROM buffer_requests
            WHERE booking_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
    }
}
