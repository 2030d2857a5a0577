// dtos/workerdtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::assignmentmodel::{
        AssignmentStatus, LocationStatus, MaterialUsed, WorkerAssignment, WorkerLocation,
    },
    service::assignment_service::CompletionReport,
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct AssignWorkerDto {
    pub worker_id: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotesDto {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RejectAssignmentDto {
    #[validate(length(min = 1, max = 500, message = "A rejection reason is required"))]
    pub reason: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDto {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 0.0))]
    pub quantity: Option<f64>,
    #[validate(length(max = 30))]
    pub unit: Option<String>,
    #[validate(range(min = 0.0))]
    pub cost: Option<f64>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteAssignmentDto {
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub materials_used: Vec<MaterialDto>,
    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 photos can be attached"))]
    pub photos: Vec<String>,
}

impl CompleteAssignmentDto {
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        self.materials_used.iter().try_for_each(|m| m.validate())
    }

    pub fn into_report(self) -> CompletionReport {
        CompletionReport {
            notes: self.notes,
            materials_used: self
                .materials_used
                .into_iter()
                .map(|m| MaterialUsed {
                    name: m.name,
                    quantity: m.quantity,
                    unit: m.unit,
                    cost: m.cost,
                })
                .collect(),
            photos: self
                .photos
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct BufferRequestDto {
    #[validate(range(min = 1, max = 480, message = "Additional minutes must be between 1 and 480"))]
    pub additional_minutes: i32,
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub reason: String,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveBufferDto {
    #[validate(range(min = 1, max = 480))]
    pub approved_minutes: Option<i32>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdateDto {
    pub assignment_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    #[validate(range(min = 0.0))]
    pub accuracy: Option<f64>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentListQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocationDto {
    pub worker_id: Uuid,
    pub assignment_id: Uuid,
    pub booking_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub status: LocationStatus,
    pub last_updated: DateTime<Utc>,
}

impl From<WorkerLocation> for LocationDto {
    fn from(l: WorkerLocation) -> Self {
        LocationDto {
            worker_id: l.worker_id,
            assignment_id: l.assignment_id,
            booking_id: l.booking_id,
            latitude: l.latitude,
            longitude: l.longitude,
            accuracy: l.accuracy,
            status: l.status,
            last_updated: l.last_updated,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentDto {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub worker_id: Uuid,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assignment_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub materials_used: Vec<MaterialUsed>,
    pub photos: Vec<String>,
}

impl From<WorkerAssignment> for AssignmentDto {
    fn from(a: WorkerAssignment) -> Self {
        AssignmentDto {
            id: a.id,
            booking_id: a.booking_id,
            worker_id: a.worker_id,
            status: a.status,
            assigned_at: a.assigned_at,
            accepted_at: a.accepted_at,
            rejected_at: a.rejected_at,
            started_at: a.started_at,
            completed_at: a.completed_at,
            assignment_notes: a.assignment_notes,
            rejection_reason: a.rejection_reason,
            completion_notes: a.completion_notes,
            materials_used: a.materials_used.map(|m| m.0).unwrap_or_default(),
            photos: a.photos.map(|p| p.0).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_report_drops_blank_photos() {
        let dto = CompleteAssignmentDto {
            notes: Some("Replaced the valve".to_string()),
            materials_used: vec![MaterialDto {
                name: "Valve".to_string(),
                quantity: Some(1.0),
                unit: Some("pc".to_string()),
                cost: Some(250.0),
            }],
            photos: vec!["https://cdn.example/a.jpg".to_string(), "  ".to_string()],
        };
        assert!(dto.validate_all().is_ok());

        let report = dto.into_report();
        assert_eq!(report.photos, vec!["https://cdn.example/a.jpg".to_string()]);
        assert_eq!(report.materials_used.len(), 1);
        assert_eq!(report.materials_used[0].name, "Valve");
    }

    #[test]
    fn accuracy_cannot_be_negative() {
        let ok = LocationUpdateDto { assignment_id: Uuid::new_v4(), latitude: 12.97, longitude: 77.59, accuracy: Some(8.0) };
        assert!(ok.validate().is_ok());
        let bad = LocationUpdateDto { assignment_id: Uuid::new_v4(), latitude: 12.97, longitude: 77.59, accuracy: Some(-1.0) };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn buffer_minutes_are_bounded() {
        let dto = BufferRequestDto { additional_minutes: 0, reason: "Extra leak found".to_string() };
        assert!(dto.validate().is_err());
        let dto = BufferRequestDto { additional_minutes: 30, reason: "Extra leak found".to_string() };
        assert!(dto.validate().is_ok());
    }
}
