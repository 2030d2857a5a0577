// models/servicemodel.rs
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "price_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Fixed,
    Inquiry,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_type: PriceType,
    pub price: Option<i64>, // in paise, required for fixed services
    pub duration_minutes: Option<i32>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn is_fixed(&self) -> bool {
        self.price_type == PriceType::Fixed
    }

    pub fn is_inquiry(&self) -> bool {
        self.price_type == PriceType::Inquiry
    }
}

/// Per-service daily booking window that drives slot materialisation.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ServiceConfig {
    pub id: Uuid,
    pub service_id: Uuid,
    pub working_start_time: NaiveTime,
    pub working_end_time: NaiveTime,
    pub service_duration_minutes: i32,
    pub buffer_duration_minutes: i32,
    pub max_workers_per_slot: i32,
    pub advance_booking_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
