// service/assignment_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    db::{
        assignmentdb::AssignmentExt,
        bookingdb::BookingExt,
        bufferdb::BufferRequestExt,
        db::{is_unique_violation, DBClient, PgTx},
        locationdb::LocationExt,
        servicedb::ServiceCatalogExt,
        userdb::UserExt,
    },
    models::{
        assignmentmodel::{AssignmentStatus, LocationStatus, MaterialUsed, WorkerAssignment},
        bookingmodel::{duration_minutes, Booking, BookingStatus, CompletionType},
        usermodel::Principal,
    },
    service::{
        booking_service::{ensure_transition, payable_amount},
        error::ServiceError,
    },
};

/// Worker's report when closing a job.
#[derive(Debug, Clone, Default)]
pub struct CompletionReport {
    pub notes: Option<String>,
    pub materials_used: Vec<MaterialUsed>,
    pub photos: Vec<String>,
}

pub fn ensure_assignment_transition(from: AssignmentStatus, to: AssignmentStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::stale(format!(
            "Assignment cannot move from {:?} to {:?}",
            from, to
        )))
    }
}

/// Work on a closed booking is refused even when its assignment row lags behind.
pub fn ensure_booking_open(booking: &Booking) -> Result<(), ServiceError> {
    if booking.status.is_terminal() {
        Err(ServiceError::stale(format!(
            "Booking is {} and no longer accepts work updates",
            booking.status.to_str()
        )))
    } else {
        Ok(())
    }
}

/// `true` once an in-progress booking has overrun its scheduled end by more than `grace`.
pub fn is_overdue(booking: &Booking, grace: chrono::Duration, now: DateTime<Utc>) -> bool {
    booking.status == BookingStatus::InProgress
        && booking
            .scheduled_end_time
            .map(|end| end + grace < now)
            .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct AssignmentService {
    db_client: Arc<DBClient>,
}

impl AssignmentService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    async fn lock_booking(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Booking, ServiceError> {
        self.db_client
            .lock_booking_tx(tx, booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))
    }

    /// Locks booking then assignment, in that order, and checks ownership.
    async fn lock_for_worker(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
    ) -> Result<(PgTx<'static>, Booking, WorkerAssignment), ServiceError> {
        let assignment = self
            .db_client
            .get_assignment(assignment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment"))?;
        if assignment.worker_id != principal.user_id {
            return Err(ServiceError::not_found("Assignment"));
        }

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self.lock_booking(&mut tx, assignment.booking_id).await?;
        let assignment = self
            .db_client
            .lock_assignment_tx(&mut tx, assignment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment"))?;
        ensure_booking_open(&booking)?;

        Ok((tx, booking, assignment))
    }

    async fn save_assignment(
        &self,
        tx: &mut PgTx<'_>,
        assignment: &WorkerAssignment,
        expected: AssignmentStatus,
    ) -> Result<WorkerAssignment, ServiceError> {
        if !assignment.timestamps_ordered() {
            return Err(ServiceError::Internal(format!(
                "Assignment {} timestamps are out of order",
                assignment.id
            )));
        }
        self.db_client
            .update_assignment_tx(tx, assignment, expected)
            .await?
            .ok_or_else(|| ServiceError::stale("Assignment was changed by another request"))
    }

    async fn save_booking(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<Booking, ServiceError> {
        self.db_client
            .update_booking_tx(tx, booking, expected)
            .await?
            .ok_or_else(|| ServiceError::stale("Booking was changed by another request"))
    }

    pub async fn assign_worker(
        &self,
        admin: &Principal,
        booking_id: Uuid,
        worker_id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, ServiceError> {
        let worker = self
            .db_client
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Worker"))?;
        if !worker.is_active || !worker.is_available {
            return Err(ServiceError::InvalidInput(
                "Worker is not active or not available".to_string(),
            ));
        }

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self.lock_booking(&mut tx, booking_id).await?;

        if !booking.status.is_assignable() {
            return Err(ServiceError::stale(format!(
                "A {} booking cannot be assigned",
                booking.status.to_str()
            )));
        }
        if self
            .db_client
            .live_assignment_for_booking_tx(&mut tx, booking.id)
            .await?
            .is_some()
        {
            return Err(ServiceError::AssignmentConflict(booking.id));
        }
        ensure_transition(booking.status, BookingStatus::Assigned)?;

        let assignment = self
            .db_client
            .insert_assignment_tx(&mut tx, booking.id, worker.user_id, admin.user_id, notes)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::AssignmentConflict(booking_id)
                } else {
                    ServiceError::Database(e)
                }
            })?;

        let mut updated = booking.clone();
        updated.status = BookingStatus::Assigned;
        self.save_booking(&mut tx, &updated, booking.status).await?;

        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            worker_id = %worker.user_id,
            assignment_id = %assignment.id,
            "Worker assigned"
        );
        Ok(assignment)
    }

    pub async fn accept(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, ServiceError> {
        let (mut tx, _booking, assignment) = self.lock_for_worker(principal, assignment_id).await?;
        ensure_assignment_transition(assignment.status, AssignmentStatus::Accepted)?;

        let mut updated = assignment.clone();
        updated.status = AssignmentStatus::Accepted;
        updated.accepted_at = Some(Utc::now());
        updated.acceptance_notes = notes;

        let saved = self.save_assignment(&mut tx, &updated, assignment.status).await?;
        tx.commit().await?;

        tracing::info!(assignment_id = %saved.id, worker_id = %saved.worker_id, "Assignment accepted");
        Ok(saved)
    }

    /// The rejected row stays for audit; the booking goes back to `scheduled`.
    pub async fn reject(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
        reason: String,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, ServiceError> {
        let (mut tx, booking, assignment) = self.lock_for_worker(principal, assignment_id).await?;
        ensure_assignment_transition(assignment.status, AssignmentStatus::Rejected)?;
        ensure_transition(booking.status, BookingStatus::Scheduled)?;

        let mut updated = assignment.clone();
        updated.status = AssignmentStatus::Rejected;
        updated.rejected_at = Some(Utc::now());
        updated.rejection_reason = Some(reason);
        updated.rejection_notes = notes;
        let saved = self.save_assignment(&mut tx, &updated, assignment.status).await?;

        self.db_client
            .close_active_locations_tx(&mut tx, assignment.id, LocationStatus::Stopped)
            .await?;

        let mut rebooked = booking.clone();
        rebooked.status = BookingStatus::Scheduled;
        self.save_booking(&mut tx, &rebooked, booking.status).await?;

        tx.commit().await?;

        tracing::info!(assignment_id = %saved.id, booking_id = %booking.id, "Assignment rejected");
        Ok(saved)
    }

    pub async fn start(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, ServiceError> {
        let (mut tx, booking, assignment) = self.lock_for_worker(principal, assignment_id).await?;
        ensure_assignment_transition(assignment.status, AssignmentStatus::InProgress)?;
        ensure_transition(booking.status, BookingStatus::InProgress)?;

        let now = Utc::now();
        let mut updated = assignment.clone();
        updated.status = AssignmentStatus::InProgress;
        updated.started_at = Some(now);
        updated.start_notes = notes;
        let saved = self.save_assignment(&mut tx, &updated, assignment.status).await?;

        let mut started = booking.clone();
        started.status = BookingStatus::InProgress;
        started.actual_start_time = Some(now);
        self.save_booking(&mut tx, &started, booking.status).await?;

        tx.commit().await?;

        tracing::info!(assignment_id = %saved.id, booking_id = %booking.id, "Service started");
        Ok(saved)
    }

    /// Closes the assignment and the booking together and credits the worker.
    async fn finish_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        assignment: &WorkerAssignment,
        completion_type: CompletionType,
        report: CompletionReport,
    ) -> Result<WorkerAssignment, ServiceError> {
        ensure_assignment_transition(assignment.status, AssignmentStatus::Completed)?;
        ensure_transition(booking.status, BookingStatus::Completed)?;

        let now = Utc::now();
        let mut updated = assignment.clone();
        updated.status = AssignmentStatus::Completed;
        updated.completed_at = Some(now);
        updated.completion_notes = report.notes;
        if !report.materials_used.is_empty() {
            updated.materials_used = Some(Json(report.materials_used));
        }
        if !report.photos.is_empty() {
            updated.photos = Some(Json(report.photos));
        }
        let saved = self.save_assignment(tx, &updated, assignment.status).await?;

        let started_at = booking.actual_start_time.or(assignment.started_at).unwrap_or(now);
        let mut completed = booking.clone();
        completed.status = BookingStatus::Completed;
        completed.completion_type = Some(completion_type);
        completed.actual_end_time = Some(now);
        completed.actual_duration_minutes = Some(duration_minutes(started_at, now));
        self.save_booking(tx, &completed, booking.status).await?;

        let service = self.db_client.get_service(booking.service_id).await?;
        let earnings = service
            .as_ref()
            .and_then(|s| payable_amount(booking, s))
            .unwrap_or(0);
        let worker = self
            .db_client
            .credit_worker_stats_tx(tx, assignment.worker_id, earnings)
            .await?;

        self.db_client
            .close_active_locations_tx(tx, assignment.id, LocationStatus::Completed)
            .await?;
        self.db_client.cancel_pending_buffer_requests_tx(tx, booking.id).await?;

        tracing::info!(
            booking_id = %booking.id,
            assignment_id = %assignment.id,
            worker_id = %assignment.worker_id,
            completion = ?completion_type,
            earnings,
            total_jobs = worker.total_jobs,
            "Service completed"
        );
        Ok(saved)
    }

    pub async fn complete(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
        report: CompletionReport,
    ) -> Result<WorkerAssignment, ServiceError> {
        let (mut tx, booking, assignment) = self.lock_for_worker(principal, assignment_id).await?;
        let saved = self
            .finish_tx(&mut tx, &booking, &assignment, CompletionType::Manual, report)
            .await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn complete_booking(
        &self,
        booking_id: Uuid,
        completion_type: CompletionType,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, ServiceError> {
        let mut tx = self.db_client.begin_tx().await?;
        let booking = self.lock_booking(&mut tx, booking_id).await?;
        if booking.status != BookingStatus::InProgress {
            return Err(ServiceError::stale("Only a booking in progress can be completed"));
        }
        let live = self
            .db_client
            .live_assignment_for_booking_tx(&mut tx, booking.id)
            .await?
            .ok_or_else(|| ServiceError::stale("Booking has no active assignment"))?;
        let assignment = self
            .db_client
            .lock_assignment_tx(&mut tx, live.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment"))?;

        let report = CompletionReport {
            notes,
            ..Default::default()
        };
        let saved = self
            .finish_tx(&mut tx, &booking, &assignment, completion_type, report)
            .await?;
        tx.commit().await?;
        Ok(saved)
    }

    pub async fn force_complete(
        &self,
        admin: &Principal,
        booking_id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkerAssignment, ServiceError> {
        tracing::info!(booking_id = %booking_id, admin_id = %admin.user_id, "Admin forcing completion");
        self.complete_booking(booking_id, CompletionType::AdminForced, notes)
            .await
    }

    /// Sweep step for bookings that overran their window. `Ok(false)` when
    /// the booking no longer qualifies.
    pub async fn auto_complete(&self, booking_id: Uuid, grace: chrono::Duration) -> Result<bool, ServiceError> {
        let booking = match self.db_client.get_booking(booking_id).await? {
            Some(b) => b,
            None => return Ok(false),
        };
        if !is_overdue(&booking, grace, Utc::now()) {
            return Ok(false);
        }

        match self
            .complete_booking(booking_id, CompletionType::TimeExpired, Some("Completed automatically".to_string()))
            .await
        {
            Ok(_) => Ok(true),
            Err(ServiceError::StaleState(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn list_for_worker(
        &self,
        principal: &Principal,
        status: Option<AssignmentStatus>,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<WorkerAssignment>, i64), ServiceError> {
        Ok(self
            .db_client
            .list_worker_assignments(principal.user_id, status, page, limit)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        bookingmodel::{BookingAddress, BookingType},
        paymentmodel::PaymentStatus,
    };
    use chrono::Duration;

    fn in_progress_booking(end: Option<DateTime<Utc>>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            booking_reference: "BK20250601100000XYZ789".to_string(),
            user_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            time_slot_id: Some(Uuid::new_v4()),
            booking_type: BookingType::Regular,
            status: BookingStatus::InProgress,
            payment_status: PaymentStatus::Completed,
            scheduled_date: Some(now.date_naive()),
            scheduled_time: end.map(|e| e - Duration::minutes(75)),
            scheduled_end_time: end,
            actual_start_time: Some(now - Duration::minutes(80)),
            actual_end_time: None,
            actual_duration_minutes: None,
            hold_expires_at: None,
            address: Json(BookingAddress::default()),
            description: None,
            contact_person: "Ravi".to_string(),
            contact_phone: "9123456780".to_string(),
            special_instructions: None,
            quote_amount: None,
            quote_notes: None,
            quote_provided_by: None,
            quote_provided_at: None,
            quote_accepted_at: None,
            quote_expires_at: None,
            rejection_reason: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            completion_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn overdue_needs_grace_to_pass() {
        let now = Utc::now();
        let grace = Duration::minutes(15);

        assert!(!is_overdue(&in_progress_booking(Some(now - Duration::minutes(10))), grace, now));
        assert!(is_overdue(&in_progress_booking(Some(now - Duration::minutes(16))), grace, now));
        assert!(!is_overdue(&in_progress_booking(None), grace, now));

        let mut done = in_progress_booking(Some(now - Duration::hours(2)));
        done.status = BookingStatus::Completed;
        assert!(!is_overdue(&done, grace, now));
    }

    #[test]
    fn assignment_guard_rejects_skips() {
        assert!(ensure_assignment_transition(AssignmentStatus::Assigned, AssignmentStatus::Accepted).is_ok());
        assert!(matches!(
            ensure_assignment_transition(AssignmentStatus::Assigned, AssignmentStatus::Completed),
            Err(ServiceError::StaleState(_))
        ));
    }

    #[test]
    fn closed_bookings_refuse_worker_updates() {
        let mut booking = in_progress_booking(None);
        assert!(ensure_booking_open(&booking).is_ok());

        for closed in [
            BookingStatus::Cancelled,
            BookingStatus::Completed,
            BookingStatus::Expired,
            BookingStatus::Rejected,
        ] {
            booking.status = closed;
            assert!(matches!(ensure_booking_open(&booking), Err(ServiceError::StaleState(_))));
        }
    }

    #[test]
    fn duration_matches_worked_minutes() {
        let start = Utc::now();
        let end = start + Duration::minutes(57);
        assert_eq!(duration_minutes(start, end), 57);
    }
}
