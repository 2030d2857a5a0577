// db/subscriptiondb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::subscriptionmodels::{SubscriptionPlan, SubscriptionStatus, UserSubscription};

#[async_trait]
pub trait SubscriptionExt {
    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<SubscriptionPlan>, Error>;

    async fn insert_subscription_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        plan_id: Uuid,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        payment_id: Option<Uuid>,
    ) -> Result<UserSubscription, Error>;

    async fn lock_subscription_tx(
        &self,
        tx: &mut PgTx<'_>,
        subscription_id: Uuid,
    ) -> Result<Option<UserSubscription>, Error>;

    async fn set_subscription_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<UserSubscription, Error>;

    async fn user_subscriptions_tx(&self, tx: &mut PgTx<'_>, user_id: Uuid) -> Result<Vec<UserSubscription>, Error>;

    async fn user_subscriptions(&self, user_id: Uuid) -> Result<Vec<UserSubscription>, Error>;

    /// Flips active subscriptions past `end_date` to expired and returns the affected user ids.
    async fn expire_due_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Error>;

    /// Each user's latest live subscription, when it ends inside `(now, horizon]`.
    async fn coverage_ending_within(
        &self,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<UserSubscription>, Error>;

    /// `false` when the user was already warned for this bucket of this coverage end.
    async fn insert_expiry_warning(&self, subscription: &UserSubscription, days_left: i32) -> Result<bool, Error>;
}

#[async_trait]
impl SubscriptionExt for DBClient {
    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<SubscriptionPlan>, Error> {
        sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE id = $1 AND is_active = true",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_subscription_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        plan_id: Uuid,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        payment_id: Option<Uuid>,
    ) -> Result<UserSubscription, Error> {
        sqlx::query_as::<_, UserSubscription>(
            r#"
            INSERT INTO user_subscriptions
            (user_id, plan_id, start_date, end_date, status, payment_id)
            VALUES ($1, $2, $3, $4, 'active', $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(start_date)
        .bind(end_date)
        .bind(payment_id)
        .fetch_one(&mut **tx)
        .await
    }

    async fn lock_subscription_tx(
        &self,
        tx: &mut PgTx<'_>,
        subscription_id: Uuid,
    ) -> Result<Option<UserSubscription>, Error> {
        sqlx::query_as::<_, UserSubscription>("SELECT * FROM user_subscriptions WHERE id = $1 FOR UPDATE")
            .bind(subscription_id)
            .fetch_optional(&mut **tx)
            .await
    }

    async fn set_subscription_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<UserSubscription, Error> {
        sqlx::query_as::<_, UserSubscription>(
            r#"
            UPDATE user_subscriptions
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
    }

    async fn user_subscriptions_tx(&self, tx: &mut PgTx<'_>, user_id: Uuid) -> Result<Vec<UserSubscription>, Error> {
        sqlx::query_as::<_, UserSubscription>(
            "SELECT * FROM user_subscriptions WHERE user_id = $1 ORDER BY end_date DESC",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
    }

    async fn user_subscriptions(&self, user_id: Uuid) -> Result<Vec<UserSubscription>, Error> {
        sqlx::query_as::<_, UserSubscription>(
            "SELECT * FROM user_subscriptions WHERE user_id = $1 ORDER BY end_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn expire_due_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Error> {
        sqlx::query_scalar(
            r#"
            UPDATE user_subscriptions
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'active' AND end_date <= $1
            RETURNING user_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
    }

    async fn coverage_ending_within(
        &self,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<UserSubscription>, Error> {
        sqlx::query_as::<_, UserSubscription>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (user_id) *
                FROM user_subscriptions
                WHERE status = 'active' AND end_date > $1
                ORDER BY user_id, end_date DESC
            ) latest
            WHERE latest.end_date <= $2
            "#,
        )
        .bind(now)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
    }

    async fn insert_expiry_warning(&self, subscription: &UserSubscription, days_left: i32) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_warnings (user_id, subscription_id, days_left, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, days_left, expires_at) DO NOTHING
            "#,
        )
        .bind(subscription.user_id)
        .bind(subscription.id)
        .bind(days_left)
        .bind(subscription.end_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
