// db/walletdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::{DBClient, PgTx};
use crate::models::paymentmodel::{WalletTransaction, WalletTransactionType};

#[derive(Debug, Clone)]
pub struct WalletEntry {
    pub user_id: Uuid,
    pub transaction_type: WalletTransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_id: String,
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub description: String,
}

#[async_trait]
pub trait WalletExt {
    /// Appends a completed ledger row and moves `users.wallet_balance` to
    /// `entry.balance_after`. Caller holds the user row lock.
    async fn append_wallet_entry_tx(
        &self,
        tx: &mut PgTx<'_>,
        entry: WalletEntry,
    ) -> Result<WalletTransaction, Error>;

    async fn list_wallet_transactions(
        &self,
        user_id: Uuid,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<WalletTransaction>, i64), Error>;

    /// Full ledger in insertion order, for reconciliation.
    async fn wallet_ledger(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, Error>;
}

#[async_trait]
impl WalletExt for DBClient {
    async fn append_wallet_entry_tx(
        &self,
        tx: &mut PgTx<'_>,
        entry: WalletEntry,
    ) -> Result<WalletTransaction, Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET wallet_balance = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.balance_after)
        .execute(&mut **tx)
        .await?;

        sqlx::query_as::<_, WalletTransaction>(
            r#"
            INSERT INTO wallet_transactions
            (user_id, transaction_type, status, amount, balance_after, reference_id,
             payment_id, booking_id, description, created_at)
            VALUES ($1, $2, 'completed', $3, $4, $5, $6, $7, $8, clock_timestamp())
            RETURNING *
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.transaction_type)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.reference_id)
        .bind(entry.payment_id)
        .bind(entry.booking_id)
        .bind(entry.description)
        .fetch_one(&mut **tx)
        .await
    }

    async fn list_wallet_transactions(
        &self,
        user_id: Uuid,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<WalletTransaction>, i64), Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let transactions = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT * FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((transactions, total))
    }

    async fn wallet_ledger(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, Error> {
        sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT * FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
