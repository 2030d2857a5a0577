// models/assignmentmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    Rejected,
    InProgress,
    Completed,
    /// The booking was cancelled underneath the assignment.
    Cancelled,
}

impl AssignmentStatus {
    pub fn can_transition_to(&self, to: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, to),
            (Assigned, Accepted)
                | (Assigned, Rejected)
                | (Accepted, InProgress)
                | (InProgress, Completed)
                | (Assigned | Accepted | InProgress, Cancelled)
        )
    }

    /// Location updates are accepted only while the worker is on the job.
    pub fn allows_tracking(&self) -> bool {
        matches!(self, AssignmentStatus::Accepted | AssignmentStatus::InProgress)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct MaterialUsed {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub cost: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct WorkerAssignment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub worker_id: Uuid,
    pub assigned_by: Uuid,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assignment_notes: Option<String>,
    pub acceptance_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejection_notes: Option<String>,
    pub start_notes: Option<String>,
    pub completion_notes: Option<String>,
    pub materials_used: Option<Json<Vec<MaterialUsed>>>,
    pub photos: Option<Json<Vec<String>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerAssignment {
    /// `assigned_at <= accepted_at <= started_at <= completed_at` over the stamps present.
    pub fn timestamps_ordered(&self) -> bool {
        let stamps: Vec<DateTime<Utc>> = [
            Some(self.assigned_at),
            self.accepted_at,
            self.started_at,
            self.completed_at,
        ]
        .into_iter()
        .flatten()
        .collect();
        stamps.windows(2).all(|w| w[0] <= w[1])
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "buffer_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BufferRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BufferRequest {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub worker_id: Uuid,
    pub requested_additional_minutes: i32,
    pub reason: String,
    pub status: BufferRequestStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_minutes: Option<i32>,
    pub admin_notes: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BufferRequest {
    /// Minutes to add on approval: the admin override when given, else the request.
    pub fn minutes_to_apply(&self, override_minutes: Option<i32>) -> i32 {
        override_minutes.unwrap_or(self.requested_additional_minutes)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "location_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Tracking,
    Stopped,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct WorkerLocation {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub assignment_id: Uuid,
    pub booking_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub status: LocationStatus,
    pub last_updated: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use AssignmentStatus::*;

    #[test]
    fn assignment_lifecycle() {
        assert!(Assigned.can_transition_to(Accepted));
        assert!(Assigned.can_transition_to(Rejected));
        assert!(Accepted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));

        assert!(!Accepted.can_transition_to(Rejected));
        assert!(!Assigned.can_transition_to(InProgress));
        assert!(!Rejected.can_transition_to(Accepted));
        assert!(!Completed.can_transition_to(InProgress));
    }

    #[test]
    fn booking_cancellation_closes_open_assignments() {
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Rejected.can_transition_to(Cancelled));

        assert!(!Cancelled.allows_tracking());
        assert!(!Cancelled.can_transition_to(InProgress));
    }

    #[test]
    fn tracking_window() {
        assert!(Accepted.allows_tracking());
        assert!(InProgress.allows_tracking());
        assert!(!Assigned.allows_tracking());
        assert!(!Completed.allows_tracking());
    }

    #[test]
    fn timestamp_order_check() {
        let t0 = Utc::now();
        let mut assignment = WorkerAssignment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            worker_id: Uuid::new_v4(),
            assigned_by: Uuid::new_v4(),
            status: Completed,
            assigned_at: t0,
            accepted_at: Some(t0),
            rejected_at: None,
            started_at: Some(t0 + Duration::minutes(5)),
            completed_at: Some(t0 + Duration::minutes(62)),
            assignment_notes: None,
            acceptance_notes: None,
            rejection_reason: None,
            rejection_notes: None,
            start_notes: None,
            completion_notes: None,
            materials_used: None,
            photos: None,
            created_at: t0,
            updated_at: t0,
        };
        assert!(assignment.timestamps_ordered());

        assignment.started_at = Some(t0 - Duration::minutes(1));
        assert!(!assignment.timestamps_ordered());
    }
}
