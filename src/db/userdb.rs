// db/userdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::usermodel::{User, Worker};

#[async_trait]
pub trait UserExt {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error>;

    /// Row lock on the user; serializes every wallet movement for that user.
    async fn lock_user_tx(&self, tx: &mut PgTx<'_>, user_id: Uuid) -> Result<Option<User>, Error>;

    async fn set_subscription_flag_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        has_active_subscription: bool,
        subscription_expiry: Option<DateTime<Utc>>,
    ) -> Result<(), Error>;

    async fn get_worker(&self, user_id: Uuid) -> Result<Option<Worker>, Error>;

    async fn credit_worker_stats_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        earnings: i64,
    ) -> Result<Worker, Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn lock_user_tx(&self, tx: &mut PgTx<'_>, user_id: Uuid) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn set_subscription_flag_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        has_active_subscription: bool,
        subscription_expiry: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET has_active_subscription = $2,
                subscription_expiry = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(has_active_subscription)
        .bind(subscription_expiry)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn get_worker(&self, user_id: Uuid) -> Result<Option<Worker>, Error> {
        sqlx::query_as::<_, Worker>(
            r#"
            SELECT * FROM workers
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn credit_worker_stats_tx(
        &self,
        tx: &mut PgTx<'_>,
        user_id: Uuid,
        earnings: i64,
    ) -> Result<Worker, Error> {
        sqlx::query_as::<_, Worker>(
            r#"
            UPDATE workers
            SET total_jobs = total_jobs + 1,
                total_bookings = total_bookings + 1,
                earnings = earnings + $2,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(earnings)
        .fetch_one(&mut **tx)
        .await
    }
}
