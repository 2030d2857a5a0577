// models/usermodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Normal,
    Worker,
    Broker,
    Admin,
}

impl UserType {
    pub fn to_str(&self) -> &str {
        match self {
            UserType::Normal => "normal",
            UserType::Worker => "worker",
            UserType::Broker => "broker",
            UserType::Admin => "admin",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub user_type: UserType,
    pub is_active: bool,
    pub wallet_balance: i64, // in paise
    pub wallet_limit: i64,   // in paise
    pub has_active_subscription: bool,
    pub subscription_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Headroom left before the wallet limit is reached.
    pub fn wallet_headroom(&self) -> i64 {
        (self.wallet_limit - self.wallet_balance).max(0)
    }
}

/// Worker statistics row, keyed by the worker's user id.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Worker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub is_active: bool,
    pub is_available: bool,
    pub total_jobs: i32,
    pub total_bookings: i32,
    pub earnings: i64,
    pub rating: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller on whose behalf a core operation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub user_type: UserType,
    #[serde(default)]
    pub admin_roles: Vec<String>,
}

impl Principal {
    pub fn new(user_id: Uuid, user_type: UserType, admin_roles: Vec<String>) -> Self {
        Self { user_id, user_type, admin_roles }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn is_worker(&self) -> bool {
        self.user_type == UserType::Worker
    }

    pub fn has_admin_role(&self, role: &str) -> bool {
        self.is_admin() && (self.admin_roles.is_empty() || self.admin_roles.iter().any(|r| r == role || r == "super_admin"))
    }
}

/// Masks all but the last four digits of a phone number.
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let visible = digits.len() - 4;
    digits
        .iter()
        .enumerate()
        .map(|(i, c)| if i < visible && c.is_ascii_digit() { '*' } else { *c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone_keeps_last_four() {
        assert_eq!(mask_phone("9876543210"), "******3210");
        assert_eq!(mask_phone("+919876543210"), "+********3210");
    }

    #[test]
    fn test_mask_phone_short_numbers() {
        assert_eq!(mask_phone("123"), "***");
        assert_eq!(mask_phone(""), "");
    }

    #[test]
    fn test_admin_roles() {
        let admin = Principal::new(Uuid::new_v4(), UserType::Admin, vec![]);
        assert!(admin.has_admin_role("booking_manager"));

        let scoped = Principal::new(Uuid::new_v4(), UserType::Admin, vec!["finance".to_string()]);
        assert!(scoped.has_admin_role("finance"));
        assert!(!scoped.has_admin_role("booking_manager"));

        let worker = Principal::new(Uuid::new_v4(), UserType::Worker, vec!["finance".to_string()]);
        assert!(!worker.has_admin_role("finance"));
        assert!(worker.is_worker());
    }
}
