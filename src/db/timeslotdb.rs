// db/timeslotdb.rs
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::timeslotmodel::TimeSlot;

#[async_trait]
pub trait TimeSlotExt {
    /// Inserts the given windows, leaving existing rows untouched. Concurrent
    /// materialisation converges on the `(service_id, date, start_time)` key.
    async fn materialize_slots(
        &self,
        service_id: Uuid,
        date: NaiveDate,
        windows: &[(NaiveTime, NaiveTime)],
        total_workers: i32,
        service_duration_minutes: i32,
        buffer_duration_minutes: i32,
    ) -> Result<u64, Error>;

    async fn list_slots(&self, service_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, Error>;

    async fn find_slot_tx(
        &self,
        tx: &mut PgTx<'_>,
        service_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlot>, Error>;

    async fn lock_slot_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<Option<TimeSlot>, Error>;

    /// Decrements capacity; `None` when the slot is full or inactive.
    async fn reserve_slot_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<Option<TimeSlot>, Error>;

    /// Increments capacity; `None` when the slot is already at `total_workers`.
    async fn release_slot_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<Option<TimeSlot>, Error>;
}

#[async_trait]
impl TimeSlotExt for DBClient {
    async fn materialize_slots(
        &self,
        service_id: Uuid,
        date: NaiveDate,
        windows: &[(NaiveTime, NaiveTime)],
        total_workers: i32,
        service_duration_minutes: i32,
        buffer_duration_minutes: i32,
    ) -> Result<u64, Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for (start_time, end_time) in windows {
            let result = sqlx::query(
                r#"
                INSERT INTO time_slots
                (service_id, date, start_time, end_time, total_workers, available_workers,
                 service_duration_minutes, buffer_duration_minutes, is_active)
                VALUES ($1, $2, $3, $4, $5, $5, $6, $7, true)
                ON CONFLICT (service_id, date, start_time) DO NOTHING
                "#,
            )
            .bind(service_id)
            .bind(date)
            .bind(start_time)
            .bind(end_time)
            .bind(total_workers)
            .bind(service_duration_minutes)
            .bind(buffer_duration_minutes)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_slots(&self, service_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, Error> {
        sqlx::query_as::<_, TimeSlot>(
            r#"
            SELECT * FROM time_slots
            WHERE service_id = $1 AND date = $2 AND deleted_at IS NULL
            ORDER BY start_time ASC
            "#,
        )
        .bind(service_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_slot_tx(
        &self,
        tx: &mut PgTx<'_>,
        service_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlot>, Error> {
        sqlx::query_as::<_, TimeSlot>(
            r#"
            SELECT * FROM time_slots
            WHERE service_id = $1 AND date = $2 AND start_time = $3 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(service_id)
        .bind(date)
        .bind(start_time)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn lock_slot_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<Option<TimeSlot>, Error> {
        sqlx::query_as::<_, TimeSlot>("SELECT * FROM time_slots WHERE id = $1 FOR UPDATE")
            .bind(slot_id)
            .fetch_optional(&mut **tx)
            .await
    }

    async fn reserve_slot_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<Option<TimeSlot>, Error> {
        sqlx::query_as::<_, TimeSlot>(
            r#"
            UPDATE time_slots
            SET available_workers = available_workers - 1, updated_at = NOW()
            WHERE id = $1 AND is_active = true AND available_workers > 0
            RETURNING *
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn release_slot_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<Option<TimeSlot>, Error> {
        sqlx::query_as::<_, TimeSlot>(
            r#"
            UPDATE time_slots
            SET available_workers = available_workers + 1, updated_at = NOW()
            WHERE id = $1 AND available_workers < total_workers
            RETURNING *
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&mut **tx)
        .await
    }
}
