// service/location_service.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::{assignmentdb::AssignmentExt, bookingdb::BookingExt, db::DBClient, locationdb::LocationExt},
    models::{assignmentmodel::WorkerLocation, usermodel::Principal},
    service::{assignment_service::ensure_booking_open, error::ServiceError},
};

pub const LOCATION_RETENTION_DAYS: i64 = 30;

pub fn check_coordinates(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Result<(), ServiceError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ServiceError::InvalidInput("Latitude must be between -90 and 90".to_string()));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ServiceError::InvalidInput("Longitude must be between -180 and 180".to_string()));
    }
    if accuracy.map(|a| !a.is_finite() || a < 0.0).unwrap_or(false) {
        return Err(ServiceError::InvalidInput("Accuracy must be a non-negative number".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LocationService {
    db_client: Arc<DBClient>,
}

impl LocationService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    /// Updates the worker's single active position for the assignment.
    pub async fn update_location(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    ) -> Result<WorkerLocation, ServiceError> {
        check_coordinates(latitude, longitude, accuracy)?;

        let assignment = self
            .db_client
            .get_assignment(assignment_id)
            .await?
            .filter(|a| a.worker_id == principal.user_id)
            .ok_or_else(|| ServiceError::not_found("Assignment"))?;
        if !assignment.status.allows_tracking() {
            return Err(ServiceError::stale(
                "Location can only be shared for accepted or in-progress assignments",
            ));
        }
        let booking = self
            .db_client
            .get_booking(assignment.booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        ensure_booking_open(&booking)?;

        let location = self
            .db_client
            .upsert_active_location(
                principal.user_id,
                assignment.id,
                assignment.booking_id,
                latitude,
                longitude,
                accuracy,
            )
            .await?;

        tracing::debug!(assignment_id = %assignment.id, worker_id = %principal.user_id, "Location updated");
        Ok(location)
    }

    /// Latest active position of an assignment, for its worker or an admin.
    pub async fn current_location(
        &self,
        principal: &Principal,
        assignment_id: Uuid,
    ) -> Result<Option<WorkerLocation>, ServiceError> {
        let assignment = self
            .db_client
            .get_assignment(assignment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment"))?;
        if !(principal.is_admin() || assignment.worker_id == principal.user_id) {
            return Err(ServiceError::not_found("Assignment"));
        }
        Ok(self.db_client.active_location(assignment.id).await?)
    }

    pub async fn purge_stale(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::days(LOCATION_RETENTION_DAYS);
        Ok(self.db_client.purge_inactive_locations(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_bounded() {
        assert!(check_coordinates(12.97, 77.59, Some(5.0)).is_ok());
        assert!(check_coordinates(-90.0, 180.0, None).is_ok());
        assert!(check_coordinates(91.0, 0.0, None).is_err());
        assert!(check_coordinates(0.0, -180.5, None).is_err());
        assert!(check_coordinates(f64::NAN, 0.0, None).is_err());
        assert!(check_coordinates(0.0, 0.0, Some(-1.0)).is_err());
    }
}
