// service/subscription_service.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{
        cache::{subscription_flag_key, CacheHelper, SUBSCRIPTION_FLAG_TTL},
        db::{DBClient, PgTx},
        paymentdb::{NewPayment, PaymentExt},
        subscriptiondb::SubscriptionExt,
        userdb::UserExt,
    },
    models::{
        paymentmodel::{
            Payment, PaymentMetadata, PaymentMethod, PaymentStatus, PaymentType, WalletTransactionType,
        },
        subscriptionmodels::{
            derive_active_flag, warning_bucket, SubscriptionStatus, UserSubscription, EXPIRY_WARNING_DAYS,
        },
        usermodel::Principal,
    },
    service::{
        admin_config::AdminConfigService,
        booking_service::PaymentChoice,
        error::ServiceError,
        payment_gateway::{ProviderOrder, RazorpayService},
        wallet_service::{DebitPurpose, WalletService},
    },
    utils::reference::payment_reference,
};

/// Cached projection of `users.has_active_subscription`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionFlag {
    pub active: bool,
    pub expiry: Option<DateTime<Utc>>,
}

impl SubscriptionFlag {
    pub fn derive(subscriptions: &[UserSubscription], now: DateTime<Utc>) -> Self {
        let expiry = subscriptions
            .iter()
            .filter(|s| s.is_live(now))
            .map(|s| s.end_date)
            .max();
        Self {
            active: derive_active_flag(subscriptions, now),
            expiry,
        }
    }

    /// The stored flag only counts while its expiry is still ahead of `now`.
    pub fn as_of(self, now: DateTime<Utc>) -> Self {
        Self {
            active: self.active && self.expiry.is_some_and(|at| at > now),
            expiry: self.expiry,
        }
    }

    /// Cache lifetime that never outlives an active flag's expiry.
    pub fn cache_ttl(&self, now: DateTime<Utc>) -> usize {
        match self.expiry {
            Some(at) if self.active => {
                let left = (at - now).num_seconds().max(1) as usize;
                left.min(SUBSCRIPTION_FLAG_TTL)
            }
            _ => SUBSCRIPTION_FLAG_TTL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub has_active_subscription: bool,
    pub subscription_expiry: Option<DateTime<Utc>>,
    pub subscriptions: Vec<UserSubscription>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepReport {
    pub expired: usize,
    pub warnings: usize,
}

/// A renewal starts where the latest live subscription ends.
pub fn next_period_start(subscriptions: &[UserSubscription], now: DateTime<Utc>) -> DateTime<Utc> {
    subscriptions
        .iter()
        .filter(|s| s.is_live(now))
        .map(|s| s.end_date)
        .max()
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
pub struct SubscriptionService {
    db_client: Arc<DBClient>,
    gateway: Arc<RazorpayService>,
    wallet: WalletService,
    config_service: AdminConfigService,
}

impl SubscriptionService {
    pub fn new(db_client: Arc<DBClient>, gateway: Arc<RazorpayService>) -> Self {
        Self {
            wallet: WalletService::new(db_client.clone(), gateway.clone()),
            config_service: AdminConfigService::new(db_client.clone()),
            db_client,
            gateway,
        }
    }

    /// Recomputes the user's flag from their subscriptions inside `tx`.
    async fn refresh_flag_tx(&self, tx: &mut PgTx<'_>, user_id: Uuid) -> Result<SubscriptionFlag, ServiceError> {
        let subscriptions = self.db_client.user_subscriptions_tx(tx, user_id).await?;
        let flag = SubscriptionFlag::derive(&subscriptions, Utc::now());
        self.db_client
            .set_subscription_flag_tx(tx, user_id, flag.active, flag.expiry)
            .await?;
        Ok(flag)
    }

    async fn invalidate(&self, user_id: Uuid) {
        if let Some(redis) = &self.db_client.redis_client {
            if let Err(e) = CacheHelper::delete(redis, &subscription_flag_key(user_id)).await {
                tracing::warn!(user_id = %user_id, "Failed to invalidate subscription cache: {}", e);
            }
        }
    }

    pub async fn create_order(&self, principal: &Principal, plan_id: Uuid) -> Result<(Payment, ProviderOrder), ServiceError> {
        let plan = self
            .db_client
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Subscription plan"))?;
        let config = self.config_service.load().await?;
        let reference = payment_reference();

        let order = self
            .gateway
            .create_order(
                plan.price,
                "INR",
                &reference,
                serde_json::json!({ "purpose": "subscription", "plan_id": plan.id }),
                config.provider_retry_attempts,
            )
            .await?;

        let mut tx = self.db_client.begin_tx().await?;
        let payment = self
            .db_client
            .insert_payment_tx(
                &mut tx,
                NewPayment {
                    payment_reference: reference,
                    user_id: principal.user_id,
                    amount: plan.price,
                    status: PaymentStatus::Pending,
                    payment_type: PaymentType::Subscription,
                    method: PaymentMethod::Razorpay,
                    related_entity: None,
                    razorpay_order_id: Some(order.id.clone()),
                    razorpay_payment_id: None,
                    razorpay_signature: None,
                    balance_after: None,
                    metadata: PaymentMetadata {
                        description: Some(format!("Subscription: {}", plan.name)),
                        ..Default::default()
                    },
                },
            )
            .await?;
        tx.commit().await?;

        Ok((payment, order))
    }

    /// Buys (or renews) a plan and flips the user's flag in the same transaction.
    pub async fn purchase(
        &self,
        principal: &Principal,
        plan_id: Uuid,
        payment: PaymentChoice,
    ) -> Result<UserSubscription, ServiceError> {
        let plan = self
            .db_client
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Subscription plan"))?;
        if let PaymentChoice::Gateway(proof) = &payment {
            if !self
                .gateway
                .verify_signature(&proof.order_id, &proof.payment_id, &proof.signature)
            {
                return Err(ServiceError::SignatureInvalid);
            }
        }

        let mut tx = self.db_client.begin_tx().await?;
        let user_id = principal.user_id;
        self.db_client
            .lock_user_tx(&mut tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        let metadata = PaymentMetadata {
            description: Some(format!("Subscription: {}", plan.name)),
            ..Default::default()
        };
        let paid = match &payment {
            PaymentChoice::Wallet => {
                let (paid, _) = self
                    .wallet
                    .debit_tx(
                        &mut tx,
                        user_id,
                        plan.price,
                        DebitPurpose {
                            transaction_type: WalletTransactionType::Subscription,
                            payment_type: PaymentType::Subscription,
                            related: None,
                            booking_id: None,
                            description: format!("Subscription: {}", plan.name),
                            metadata,
                        },
                    )
                    .await?;
                paid
            }
            PaymentChoice::Gateway(proof) => {
                match self.db_client.find_payment_by_order_tx(&mut tx, &proof.order_id).await? {
                    Some(existing) => {
                        if existing.user_id != user_id || existing.payment_type != PaymentType::Subscription {
                            return Err(ServiceError::not_found("Payment order"));
                        }
                        if existing.status != PaymentStatus::Pending {
                            return Err(ServiceError::Conflict(
                                "Payment order has already been used".to_string(),
                            ));
                        }
                        if existing.amount != plan.price {
                            return Err(ServiceError::InvalidInput(
                                "Payment order amount does not match the plan price".to_string(),
                            ));
                        }
                        self.db_client
                            .complete_payment_tx(
                                &mut tx,
                                existing.id,
                                Some(&proof.payment_id),
                                Some(&proof.signature),
                                None,
                            )
                            .await?
                    }
                    None => {
                        self.db_client
                            .insert_payment_tx(
                                &mut tx,
                                NewPayment {
                                    payment_reference: payment_reference(),
                                    user_id,
                                    amount: plan.price,
                                    status: PaymentStatus::Completed,
                                    payment_type: PaymentType::Subscription,
                                    method: PaymentMethod::Razorpay,
                                    related_entity: None,
                                    razorpay_order_id: Some(proof.order_id.clone()),
                                    razorpay_payment_id: Some(proof.payment_id.clone()),
                                    razorpay_signature: Some(proof.signature.clone()),
                                    balance_after: None,
                                    metadata,
                                },
                            )
                            .await?
                    }
                }
            }
            PaymentChoice::Deferred => {
                return Err(ServiceError::InvalidInput(
                    "Create a subscription order first and pay it through the gateway".to_string(),
                ))
            }
        };

        let now = Utc::now();
        let existing = self.db_client.user_subscriptions_tx(&mut tx, user_id).await?;
        let start = next_period_start(&existing, now);
        let end = start + Duration::days(plan.duration_days as i64);

        let subscription = self
            .db_client
            .insert_subscription_tx(&mut tx, user_id, plan.id, start, end, Some(paid.id))
            .await?;
        let flag = self.refresh_flag_tx(&mut tx, user_id).await?;
        tx.commit().await?;
        self.invalidate(user_id).await;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            plan_id = %plan.id,
            end_date = %subscription.end_date,
            active = flag.active,
            "Subscription purchased"
        );
        Ok(subscription)
    }

    pub async fn cancel(&self, principal: &Principal, subscription_id: Uuid) -> Result<UserSubscription, ServiceError> {
        let mut tx = self.db_client.begin_tx().await?;
        let subscription = self
            .db_client
            .lock_subscription_tx(&mut tx, subscription_id)
            .await?
            .filter(|s| principal.is_admin() || s.user_id == principal.user_id)
            .ok_or_else(|| ServiceError::not_found("Subscription"))?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(ServiceError::stale("Only an active subscription can be cancelled"));
        }

        let cancelled = self
            .db_client
            .set_subscription_status_tx(&mut tx, subscription.id, SubscriptionStatus::Cancelled)
            .await?;
        let flag = self.refresh_flag_tx(&mut tx, subscription.user_id).await?;
        tx.commit().await?;
        self.invalidate(subscription.user_id).await;

        tracing::info!(
            user_id = %subscription.user_id,
            subscription_id = %subscription.id,
            active = flag.active,
            "Subscription cancelled"
        );
        Ok(cancelled)
    }

    /// Flag read through the short-TTL cache.
    pub async fn has_active_subscription(&self, user_id: Uuid) -> Result<SubscriptionFlag, ServiceError> {
        let key = subscription_flag_key(user_id);
        if let Some(redis) = &self.db_client.redis_client {
            match CacheHelper::get::<SubscriptionFlag>(redis, &key).await {
                Ok(Some(flag)) => return Ok(flag.as_of(Utc::now())),
                Ok(None) => {}
                Err(e) => tracing::warn!(user_id = %user_id, "Subscription cache read failed: {}", e),
            }
        }

        let user = self
            .db_client
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        let now = Utc::now();
        let flag = SubscriptionFlag {
            active: user.has_active_subscription,
            expiry: user.subscription_expiry,
        }
        .as_of(now);

        if let Some(redis) = &self.db_client.redis_client {
            if let Err(e) = CacheHelper::set(redis, &key, &flag, flag.cache_ttl(now)).await {
                tracing::warn!(user_id = %user_id, "Subscription cache write failed: {}", e);
            }
        }
        Ok(flag)
    }

    pub async fn overview(&self, principal: &Principal) -> Result<SubscriptionOverview, ServiceError> {
        let flag = self.has_active_subscription(principal.user_id).await?;
        let subscriptions = self.db_client.user_subscriptions(principal.user_id).await?;
        Ok(SubscriptionOverview {
            has_active_subscription: flag.active,
            subscription_expiry: flag.expiry,
            subscriptions,
        })
    }

    /// Daily sweep: expire lapsed subscriptions, fix the flags, and write expiry warnings.
    pub async fn sweep(&self) -> Result<SweepReport, ServiceError> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let mut user_ids = self.db_client.expire_due_subscriptions(now).await?;
        report.expired = user_ids.len();
        user_ids.sort();
        user_ids.dedup();

        for user_id in user_ids {
            let mut tx = self.db_client.begin_tx().await?;
            match self.refresh_flag_tx(&mut tx, user_id).await {
                Ok(_) => {
                    tx.commit().await?;
                    self.invalidate(user_id).await;
                }
                Err(e) => {
                    tracing::error!(user_id = %user_id, "Failed to refresh subscription flag: {}", e);
                }
            }
        }

        let widest = EXPIRY_WARNING_DAYS.iter().copied().max().unwrap_or(0) as i64;
        let expiring = self
            .db_client
            .coverage_ending_within(now, now + Duration::days(widest))
            .await?;
        for subscription in expiring {
            if let Some(days_left) = warning_bucket(subscription.end_date, now) {
                if self
                    .db_client
                    .insert_expiry_warning(&subscription, days_left)
                    .await?
                {
                    report.warnings += 1;
                    tracing::info!(
                        user_id = %subscription.user_id,
                        subscription_id = %subscription.id,
                        days_left,
                        "Subscription expiry warning recorded"
                    );
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::usermodel::UserType, service::fixtures};
    use sqlx::PgPool;

    fn sub(status: SubscriptionStatus, end: DateTime<Utc>) -> UserSubscription {
        let now = Utc::now();
        UserSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            plan_id: Uuid::new_v4(),
            start_date: now - Duration::days(10),
            end_date: end,
            status,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn flag_tracks_latest_live_subscription() {
        let now = Utc::now();
        let later = now + Duration::days(20);
        let subs = vec![
            sub(SubscriptionStatus::Active, now + Duration::days(5)),
            sub(SubscriptionStatus::Active, later),
            sub(SubscriptionStatus::Cancelled, now + Duration::days(40)),
        ];
        let flag = SubscriptionFlag::derive(&subs, now);
        assert!(flag.active);
        assert_eq!(flag.expiry, Some(later));

        let lapsed = vec![sub(SubscriptionStatus::Active, now - Duration::days(1))];
        assert_eq!(
            SubscriptionFlag::derive(&lapsed, now),
            SubscriptionFlag { active: false, expiry: None }
        );
    }

    #[test]
    fn stored_flag_lapses_at_expiry() {
        let now = Utc::now();
        let stale = SubscriptionFlag { active: true, expiry: Some(now - Duration::minutes(1)) };
        assert!(!stale.as_of(now).active);

        let current = SubscriptionFlag { active: true, expiry: Some(now + Duration::days(3)) };
        assert!(current.as_of(now).active);

        let unbounded = SubscriptionFlag { active: true, expiry: None };
        assert!(!unbounded.as_of(now).active);
    }

    #[test]
    fn cached_flag_never_outlives_expiry() {
        let now = Utc::now();
        let soon = SubscriptionFlag { active: true, expiry: Some(now + Duration::seconds(42)) };
        assert_eq!(soon.cache_ttl(now), 42);

        let later = SubscriptionFlag { active: true, expiry: Some(now + Duration::days(3)) };
        assert_eq!(later.cache_ttl(now), SUBSCRIPTION_FLAG_TTL);

        let inactive = SubscriptionFlag { active: false, expiry: None };
        assert_eq!(inactive.cache_ttl(now), SUBSCRIPTION_FLAG_TTL);
    }

    #[test]
    fn renewals_start_after_current_period() {
        let now = Utc::now();
        let end = now + Duration::days(3);
        assert_eq!(next_period_start(&[sub(SubscriptionStatus::Active, end)], now), end);
        assert_eq!(next_period_start(&[sub(SubscriptionStatus::Expired, end)], now), now);
        assert_eq!(next_period_start(&[], now), now);
    }

    fn subscription_service(pool: PgPool) -> SubscriptionService {
        let (db_client, gateway) = fixtures::clients(pool);
        SubscriptionService::new(db_client, gateway)
    }

    async fn plan(pool: &PgPool) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO subscription_plans (name, duration_days, price) VALUES ('Monthly', 30, 49900) RETURNING id",
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn subscribe(pool: &PgPool, user_id: Uuid, plan_id: Uuid, end: DateTime<Utc>) {
        sqlx::query(
            r#"
            INSERT INTO user_subscriptions (user_id, plan_id, start_date, end_date, status)
            VALUES ($1, $2, $3, $4, 'active')
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(end - Duration::days(30))
        .bind(end)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn warnings_for(pool: &PgPool, user_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM subscription_warnings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn lapsed_flag_reads_inactive_before_the_sweep(pool: PgPool) {
        let customer = fixtures::user(&pool, UserType::Normal, 0, 10_000_000).await;
        sqlx::query(
            "UPDATE users SET has_active_subscription = true, subscription_expiry = NOW() - INTERVAL '1 hour' WHERE id = $1",
        )
        .bind(customer.user_id)
        .execute(&pool)
        .await
        .unwrap();

        let flag = subscription_service(pool)
            .has_active_subscription(customer.user_id)
            .await
            .unwrap();
        assert!(!flag.active);
        assert!(flag.expiry.is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn warnings_follow_the_users_coverage_end(pool: PgPool) {
        let plan_id = plan(&pool).await;
        let renewed = fixtures::user(&pool, UserType::Normal, 0, 10_000_000).await;
        let lapsing = fixtures::user(&pool, UserType::Normal, 0, 10_000_000).await;
        let now = Utc::now();
        subscribe(&pool, renewed.user_id, plan_id, now + Duration::days(5)).await;
        subscribe(&pool, renewed.user_id, plan_id, now + Duration::days(35)).await;
        subscribe(&pool, lapsing.user_id, plan_id, now + Duration::days(5)).await;
        let subscriptions = subscription_service(pool.clone());

        let first = subscriptions.sweep().await.unwrap();
        assert_eq!(first.warnings, 1);
        assert_eq!(warnings_for(&pool, renewed.user_id).await, 0);
        assert_eq!(warnings_for(&pool, lapsing.user_id).await, 1);

        let second = subscriptions.sweep().await.unwrap();
        assert_eq!(second.warnings, 0);
        assert_eq!(warnings_for(&pool, lapsing.user_id).await, 1);
    }
}
