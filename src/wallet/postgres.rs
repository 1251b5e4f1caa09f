//! PostgreSQL Wallet Store
//!
//! Backed by the `wallets` table. Row exclusivity comes from
//! `SELECT ... FOR UPDATE` inside a READ COMMITTED transaction.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::debug;

use super::models::Wallet;
use super::store::{StoreError, WalletStore, WalletTx};
use super::validation::WalletAddress;

/// Wallet store over a PostgreSQL pool
#[derive(Clone)]
pub struct PgWalletStore {
    pool: PgPool,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    type Tx = PgWalletTx;

    async fn begin(&self) -> Result<PgWalletTx, StoreError> {
        let mut tx = self.pool.begin().await?;
        let backend_pid: i32 = sqlx::query_scalar(r#"SELECT pg_backend_pid()"#)
            .fetch_one(&mut *tx)
            .await?;

        Ok(PgWalletTx {
            tx,
            pool: self.pool.clone(),
            backend_pid,
            locked: HashSet::new(),
        })
    }

    async fn lookup(&self, address: &str) -> Result<Option<Wallet>, StoreError> {
        let wallet: Option<Wallet> =
            sqlx::query_as(r#"SELECT id, address, balance FROM wallets WHERE address = $1"#)
                .bind(address)
                .fetch_optional(&self.pool)
                .await?;

        Ok(wallet)
    }

    async fn create(
        &self,
        address: &WalletAddress,
        initial_balance: i64,
    ) -> Result<Wallet, StoreError> {
        let wallet: Wallet = sqlx::query_as(
            r#"INSERT INTO wallets (address, balance) VALUES ($1, $2)
               RETURNING id, address, balance"#,
        )
        .bind(address.as_str())
        .bind(initial_balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::AlreadyExists(_) => StoreError::AlreadyExists(address.to_string()),
            other => other,
        })?;

        debug!(wallet = %wallet, "Wallet created");
        Ok(wallet)
    }

    async fn total_balance(&self) -> Result<i64, StoreError> {
        let total: i64 =
            sqlx::query_scalar(r#"SELECT COALESCE(SUM(balance), 0)::BIGINT FROM wallets"#)
                .fetch_one(&self.pool)
                .await?;

        Ok(total)
    }
}

/// Open PostgreSQL transaction
///
/// Dropping it without `commit` lets sqlx roll the transaction back when the
/// connection returns to the pool.
pub struct PgWalletTx {
    tx: Transaction<'static, Postgres>,
    /// Side channel for `pg_cancel_backend`, never the transaction's connection
    pool: PgPool,
    backend_pid: i32,
    locked: HashSet<String>,
}

#[async_trait]
impl WalletTx for PgWalletTx {
    async fn lookup(&mut self, address: &str) -> Result<Option<Wallet>, StoreError> {
        let wallet: Option<Wallet> =
            sqlx::query_as(r#"SELECT id, address, balance FROM wallets WHERE address = $1"#)
                .bind(address)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(wallet)
    }

    async fn lock_for_update(&mut self, address: &str) -> Result<Option<Wallet>, StoreError> {
        // Re-locking a row this transaction already holds does not block in PostgreSQL
        let wallet: Option<Wallet> = sqlx::query_as(
            r#"SELECT id, address, balance FROM wallets WHERE address = $1 FOR UPDATE"#,
        )
        .bind(address)
        .fetch_optional(&mut *self.tx)
        .await?;

        if wallet.is_some() {
            self.locked.insert(address.to_string());
        }

        Ok(wallet)
    }

    async fn set_balance(&mut self, address: &str, new_balance: i64) -> Result<(), StoreError> {
        if !self.locked.contains(address) {
            return Err(StoreError::NotLocked(address.to_string()));
        }

        let result = sqlx::query(r#"UPDATE wallets SET balance = $1 WHERE address = $2"#)
            .bind(new_balance)
            .bind(address)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Unavailable(format!(
                "locked wallet row vanished: {}",
                address
            )));
        }

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }

    async fn abort(self) -> Result<(), StoreError> {
        // A dropped query future leaves its statement running server-side,
        // and a plain ROLLBACK would queue behind it
        let cancelled: bool = sqlx::query_scalar(r#"SELECT pg_cancel_backend($1)"#)
            .bind(self.backend_pid)
            .fetch_one(&self.pool)
            .await?;
        debug!(
            backend_pid = self.backend_pid,
            cancelled, "Cancel requested for in-flight statement"
        );

        let mut tx = self.tx;
        // Drains the cancelled statement's error (57014) so ROLLBACK starts clean
        let _ = sqlx::query(r#"SELECT 1"#).execute(&mut *tx).await;
        tx.rollback().await?;
        Ok(())
    }
}
