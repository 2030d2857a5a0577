// models/subscriptionmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub duration_days: i32,
    pub price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date > now
    }
}

/// Days ahead of expiry at which a warning row is written.
pub const EXPIRY_WARNING_DAYS: [i32; 2] = [7, 1];

/// The warning bucket a subscription falls in, if any.
pub fn warning_bucket(end_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<i32> {
    if end_date <= now {
        return None;
    }
    let hours_left = (end_date - now).num_hours();
    EXPIRY_WARNING_DAYS
        .iter()
        .copied()
        .filter(|days| hours_left <= (*days as i64) * 24)
        .min()
}

/// `true` iff any subscription is active with an end date in the future.
pub fn derive_active_flag(subscriptions: &[UserSubscription], now: DateTime<Utc>) -> bool {
    subscriptions.iter().any(|s| s.is_live(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sub(status: SubscriptionStatus, end_in: Duration) -> UserSubscription {
        let now = Utc::now();
        UserSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            plan_id: Uuid::new_v4(),
            start_date: now - Duration::days(30),
            end_date: now + end_in,
            status,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_flag_requires_status_and_future_end() {
        let now = Utc::now();
        assert!(derive_active_flag(&[sub(SubscriptionStatus::Active, Duration::days(3))], now));
        assert!(!derive_active_flag(&[sub(SubscriptionStatus::Active, Duration::days(-1))], now));
        assert!(!derive_active_flag(&[sub(SubscriptionStatus::Cancelled, Duration::days(3))], now));
        assert!(!derive_active_flag(&[], now));
    }

    #[test]
    fn warning_buckets() {
        let now = Utc::now();
        assert_eq!(warning_bucket(now + Duration::days(10), now), None);
        assert_eq!(warning_bucket(now + Duration::days(6), now), Some(7));
        assert_eq!(warning_bucket(now + Duration::hours(20), now), Some(1));
        assert_eq!(warning_bucket(now - Duration::hours(1), now), None);
    }
}
