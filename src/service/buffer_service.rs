// service/buffer_service.rs
use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::{
    db::{
        assignmentdb::AssignmentExt,
        bookingdb::BookingExt,
        bufferdb::BufferRequestExt,
        db::{is_unique_violation, DBClient},
    },
    models::{
        assignmentmodel::{AssignmentStatus, BufferRequest, BufferRequestStatus},
        bookingmodel::BookingStatus,
        usermodel::Principal,
    },
    service::error::ServiceError,
};

pub const MAX_BUFFER_MINUTES: i32 = 480;

pub fn check_buffer_minutes(minutes: i32) -> Result<(), ServiceError> {
    if (1..=MAX_BUFFER_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(ServiceError::InvalidInput(format!(
            "Additional minutes must be between 1 and {}",
            MAX_BUFFER_MINUTES
        )))
    }
}

#[derive(Debug, Clone)]
pub struct BufferService {
    db_client: Arc<DBClient>,
}

impl BufferService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    /// Worker asks for more time on a job in progress. One pending request per booking.
    pub async fn request_buffer(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        additional_minutes: i32,
        reason: String,
    ) -> Result<BufferRequest, ServiceError> {
        check_buffer_minutes(additional_minutes)?;
        if reason.trim().is_empty() {
            return Err(ServiceError::InvalidInput("A reason is required".to_string()));
        }

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self
            .db_client
            .lock_booking_tx(&mut tx, booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;

        let assignment = self
            .db_client
            .live_assignment_for_booking_tx(&mut tx, booking.id)
            .await?
            .filter(|a| a.worker_id == principal.user_id)
            .ok_or_else(|| ServiceError::not_found("Booking"))?;

        if booking.status != BookingStatus::InProgress || assignment.status != AssignmentStatus::InProgress {
            return Err(ServiceError::stale("Extra time can only be requested while the service is in progress"));
        }
        if self
            .db_client
            .pending_buffer_request_tx(&mut tx, booking.id)
            .await?
            .is_some()
        {
            return Err(ServiceError::PendingBufferExists(booking.id));
        }

        let request = self
            .db_client
            .insert_buffer_request_tx(&mut tx, booking.id, principal.user_id, additional_minutes, reason.trim())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::PendingBufferExists(booking_id)
                } else {
                    ServiceError::Database(e)
                }
            })?;
        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            request_id = %request.id,
            additional_minutes,
            "Buffer requested"
        );
        Ok(request)
    }

    /// Approves a pending request and pushes the booking's scheduled end out
    /// by the approved minutes, under the booking lock.
    pub async fn approve(
        &self,
        admin: &Principal,
        request_id: Uuid,
        override_minutes: Option<i32>,
        notes: Option<String>,
    ) -> Result<BufferRequest, ServiceError> {
        if let Some(minutes) = override_minutes {
            check_buffer_minutes(minutes)?;
        }

        let pending = self.pending_request(request_id).await?;

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self
            .db_client
            .lock_booking_tx(&mut tx, pending.booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        let request = self
            .db_client
            .lock_buffer_request_tx(&mut tx, request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Buffer request"))?;
        if request.status != BufferRequestStatus::Pending {
            return Err(ServiceError::stale("Buffer request was already resolved"));
        }
        if booking.status.is_terminal() {
            return Err(ServiceError::stale("Booking is already closed"));
        }

        let minutes = request.minutes_to_apply(override_minutes);
        let resolved = self
            .db_client
            .resolve_buffer_request_tx(
                &mut tx,
                request.id,
                BufferRequestStatus::Approved,
                admin.user_id,
                Some(minutes),
                notes,
            )
            .await?
            .ok_or_else(|| ServiceError::stale("Buffer request was already resolved"))?;

        let mut extended = booking.clone();
        extended.scheduled_end_time = booking
            .scheduled_end_time
            .map(|end| end + Duration::minutes(minutes as i64));
        self.db_client
            .update_booking_tx(&mut tx, &extended, booking.status)
            .await?
            .ok_or_else(|| ServiceError::stale("Booking was changed by another request"))?;

        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            request_id = %resolved.id,
            minutes,
            admin_id = %admin.user_id,
            "Buffer approved"
        );
        Ok(resolved)
    }

    pub async fn reject(
        &self,
        admin: &Principal,
        request_id: Uuid,
        notes: Option<String>,
    ) -> Result<BufferRequest, ServiceError> {
        self.pending_request(request_id).await?;

        let mut tx = self.db_client.begin_tx().await?;
        let resolved = self
            .db_client
            .resolve_buffer_request_tx(
                &mut tx,
                request_id,
                BufferRequestStatus::Rejected,
                admin.user_id,
                None,
                notes,
            )
            .await?
            .ok_or_else(|| ServiceError::stale("Buffer request was already resolved"))?;
        tx.commit().await?;

        tracing::info!(request_id = %resolved.id, admin_id = %admin.user_id, "Buffer rejected");
        Ok(resolved)
    }

    async fn pending_request(&self, request_id: Uuid) -> Result<BufferRequest, ServiceError> {
        let request = self
            .db_client
            .get_buffer_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Buffer request"))?;
        if request.status != BufferRequestStatus::Pending {
            return Err(ServiceError::stale("Buffer request was already resolved"));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_must_be_positive_and_bounded() {
        assert!(check_buffer_minutes(1).is_ok());
        assert!(check_buffer_minutes(30).is_ok());
        assert!(check_buffer_minutes(0).is_err());
        assert!(check_buffer_minutes(-5).is_err());
        assert!(check_buffer_minutes(MAX_BUFFER_MINUTES + 1).is_err());
    }
}
