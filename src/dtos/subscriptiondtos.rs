// dtos/subscriptiondtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{PaymentMethodDto, PaymentProofDto};
use crate::{
    models::subscriptionmodels::{SubscriptionStatus, UserSubscription},
    service::subscription_service::SubscriptionOverview,
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionOrderDto {
    pub plan_id: Uuid,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSubscriptionDto {
    pub plan_id: Uuid,
    pub payment_method: PaymentMethodDto,
    #[serde(flatten)]
    #[validate]
    pub proof: PaymentProofDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<UserSubscription> for SubscriptionDto {
    fn from(s: UserSubscription) -> Self {
        SubscriptionDto {
            id: s.id,
            plan_id: s.plan_id,
            start_date: s.start_date,
            end_date: s.end_date,
            status: s.status,
            payment_id: s.payment_id,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionStatusDto {
    pub has_active_subscription: bool,
    pub subscription_expiry: Option<DateTime<Utc>>,
    pub subscriptions: Vec<SubscriptionDto>,
}

impl From<SubscriptionOverview> for SubscriptionStatusDto {
    fn from(o: SubscriptionOverview) -> Self {
        SubscriptionStatusDto {
            has_active_subscription: o.has_active_subscription,
            subscription_expiry: o.subscription_expiry,
            subscriptions: o.subscriptions.into_iter().map(Into::into).collect(),
        }
    }
}
