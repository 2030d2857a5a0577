// db/assignmentdb.rs
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::assignmentmodel::{AssignmentStatus, WorkerAssignment};

#[async_trait]
pub trait AssignmentExt {
    async fn insert_assignment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        worker_id: Uuid,
        assigned_by: Uuid,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, Error>;

    async fn get_assignment(&self, assignment_id: Uuid) -> Result<Option<WorkerAssignment>, Error>;

    async fn lock_assignment_tx(
        &self,
        tx: &mut PgTx<'_>,
        assignment_id: Uuid,
    ) -> Result<Option<WorkerAssignment>, Error>;

    /// The assignment of a booking that is neither rejected nor cancelled.
    async fn live_assignment_for_booking(&self, booking_id: Uuid) -> Result<Option<WorkerAssignment>, Error>;

    async fn live_assignment_for_booking_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
    ) -> Result<Option<WorkerAssignment>, Error>;

    /// Writes status, stamps and notes, guarded by `status = expected`.
    async fn update_assignment_tx(
        &self,
        tx: &mut PgTx<'_>,
        assignment: &WorkerAssignment,
        expected: AssignmentStatus,
    ) -> Result<Option<WorkerAssignment>, Error>;

    async fn list_worker_assignments(
        &self,
        worker_id: Uuid,
        status: Option<AssignmentStatus>,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<WorkerAssignment>, i64), Error>;
}

#[async_trait]
impl AssignmentExt for DBClient {
    async fn insert_assignment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
        worker_id: Uuid,
        assigned_by: Uuid,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, Error> {
        sqlx::query_as::<_, WorkerAssignment>(
            r#"
            INSERT INTO worker_assignments
            (booking_id, worker_id, assigned_by, status, assigned_at, assignment_notes)
            VALUES ($1, $2, $3, 'assigned', $4, $5)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(worker_id)
        .bind(assigned_by)
        .bind(Utc::now())
        .bind(notes)
        .fetch_one(&mut **tx)
        .await
    }

    async fn get_assignment(&self, assignment_id: Uuid) -> Result<Option<WorkerAssignment>, Error> {
        sqlx::query_as::<_, WorkerAssignment>(
            "SELECT * FROM worker_assignments WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn lock_assignment_tx(
        &self,
        tx: &mut PgTx<'_>,
        assignment_id: Uuid,
    ) -> Result<Option<WorkerAssignment>, Error> {
        sqlx::query_as::<_, WorkerAssignment>(
            "SELECT * FROM worker_assignments WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(assignment_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn live_assignment_for_booking(&self, booking_id: Uuid) -> Result<Option<WorkerAssignment>, Error> {
        sqlx::query_as::<_, WorkerAssignment>(
            r#"
            SELECT * FROM worker_assignments
            WHERE booking_id = $1 AND status NOT IN ('rejected', 'cancelled') AND deleted_at IS NULL
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn live_assignment_for_booking_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking_id: Uuid,
    ) -> Result<Option<WorkerAssignment>, Error> {
        sqlx::query_as::<_, WorkerAssignment>(
            r#"
            SELECT * FROM worker_assignments
            WHERE booking_id = $1 AND status NOT IN ('rejected', 'cancelled') AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn update_assignment_tx(
        &self,
        tx: &mut PgTx<'_>,
        assignment: &WorkerAssignment,
        expected: AssignmentStatus,
    ) -> Result<Option<WorkerAssignment>, Error> {
        sqlx::query_as::<_, WorkerAssignment>(
            r#"
            UPDATE worker_assignments
            SET status = $3,
                accepted_at = $4,
                rejected_at = $5,
                started_at = $6,
                completed_at = $7,
                acceptance_notes = $8,
                rejection_reason = $9,
                rejection_notes = $10,
                start_notes = $11,
                completion_notes = $12,
                materials_used = $13,
                photos = $14,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(assignment.id)
        .bind(expected)
        .bind(assignment.status)
        .bind(assignment.accepted_at)
        .bind(assignment.rejected_at)
        .bind(assignment.started_at)
        .bind(assignment.completed_at)
        .bind(&assignment.acceptance_notes)
        .bind(&assignment.rejection_reason)
        .bind(&assignment.rejection_notes)
        .bind(&assignment.start_notes)
        .bind(&assignment.completion_notes)
        .bind(&assignment.materials_used)
        .bind(&assignment.photos)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn list_worker_assignments(
        &self,
        worker_id: Uuid,
        status: Option<AssignmentStatus>,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<WorkerAssignment>, i64), Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let assignments = sqlx::query_as::<_, WorkerAssignment>(
            r#"
            SELECT * FROM worker_assignments
            WHERE worker_id = $1
              AND deleted_at IS NULL
              AND ($2::assignment_status IS NULL OR status = $2)
            ORDER BY assigned_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(worker_id)
        .bind(status)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM worker_assignments
            WHERE worker_id = $1
              AND deleted_at IS NULL
              AND ($2::assignment_status IS NULL OR status = $2)
            "#,
        )
        .bind(worker_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((assignments, total))
    }
}
