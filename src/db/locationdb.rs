// db/locationdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::assignmentmodel::{LocationStatus, WorkerLocation};

#[async_trait]
pub trait LocationExt {
    /// Updates the active row for `(worker, assignment)` or inserts one.
    async fn upsert_active_location(
        &self,
        worker_id: Uuid,
        assignment_id: Uuid,
        booking_id: Uuid,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    ) -> Result<WorkerLocation, Error>;

    /// Closes every active row of the assignment with the given status.
    async fn close_active_locations_tx(
        &self,
        tx: &mut PgTx<'_>,
        assignment_id: Uuid,
        status: LocationStatus,
    ) -> Result<u64, Error>;

    async fn active_location(&self, assignment_id: Uuid) -> Result<Option<WorkerLocation>, Error>;

    async fn purge_inactive_locations(&self, older_than: DateTime<Utc>) -> Result<u64, Error>;
}

#[async_trait]
impl LocationExt for DBClient {
    async fn upsert_active_location(
        &self,
        worker_id: Uuid,
        assignment_id: Uuid,
        booking_id: Uuid,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    ) -> Result<WorkerLocation, Error> {
        sqlx::query_as::<_, WorkerLocation>(
            r#"
            INSERT INTO worker_locations
            (worker_id, assignment_id, booking_id, latitude, longitude, accuracy,
             status, last_updated, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, 'tracking', NOW(), true)
            ON CONFLICT (worker_id, assignment_id) WHERE is_active
            DO UPDATE SET
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                accuracy = EXCLUDED.accuracy,
                status = 'tracking',
                last_updated = NOW(),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(assignment_id)
        .bind(booking_id)
        .bind(latitude)
        .bind(longitude)
        .bind(accuracy)
        .fetch_one(&self.pool)
        .await
    }

    async fn close_active_locations_tx(
        &self,
        tx: &mut PgTx<'_>,
        assignment_id: Uuid,
        status: LocationStatus,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE worker_locations
            SET status = $2, is_active = false, updated_at = NOW()
            WHERE assignment_id = $1 AND is_active = true
            "#,
        )
        .bind(assignment_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn active_location(&self, assignment_id: Uuid) -> Result<Option<WorkerLocation>, Error> {
        sqlx::query_as::<_, WorkerLocation>(
            "SELECT * FROM worker_locations WHERE assignment_id = $1 AND is_active = true",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn purge_inactive_locations(&self, older_than: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            "DELETE FROM worker_locations WHERE is_active = false AND updated_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
