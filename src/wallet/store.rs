//! Wallet Store Contract
//!
//! Transaction-scoped repository operations consumed by the transfer engine.
//!
//! # Locking
//!
//! `lock_for_update` takes an exclusive row lock that is held until the
//! owning transaction commits or rolls back. Any other transaction that tries
//! to lock the same row waits. Locking the same row twice from one transaction
//! returns immediately.
//!
//! Writes made through a transaction are invisible to everyone else until
//! `commit`. Dropping a transaction without committing rolls it back.

use async_trait::async_trait;
use thiserror::Error;

use super::models::Wallet;
use super::validation::WalletAddress;

// PostgreSQL SQLSTATE codes. The first two are retryable.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

/// Store error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Wallet already exists: {0}")]
    AlreadyExists(String),

    #[error("Row not locked by this transaction: {0}")]
    NotLocked(String),

    #[error("Constraint violated: {0}")]
    CheckViolation(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Conflicts are the only store failures worth retrying as-is
    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let code = e
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());

        match code.as_deref() {
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                StoreError::Conflict(e.to_string())
            }
            Some(UNIQUE_VIOLATION) => StoreError::AlreadyExists(e.to_string()),
            Some(CHECK_VIOLATION) => StoreError::CheckViolation(e.to_string()),
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Durable mapping from address to balance
#[async_trait]
pub trait WalletStore: Send + Sync {
    type Tx: WalletTx + 'static;

    /// Open a transaction
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Point read outside any transaction, no locking
    async fn lookup(&self, address: &str) -> Result<Option<Wallet>, StoreError>;

    /// Provision a new wallet. Never called from the transfer path.
    async fn create(
        &self,
        address: &WalletAddress,
        initial_balance: i64,
    ) -> Result<Wallet, StoreError>;

    /// Sum of all committed balances
    async fn total_balance(&self) -> Result<i64, StoreError>;
}

/// An open store transaction
#[async_trait]
pub trait WalletTx: Send {
    /// Point read inside the transaction, no locking.
    /// Sees this transaction's own uncommitted writes.
    async fn lookup(&mut self, address: &str) -> Result<Option<Wallet>, StoreError>;

    /// Exclusive row lock, held until commit or rollback
    async fn lock_for_update(&mut self, address: &str) -> Result<Option<Wallet>, StoreError>;

    /// Overwrite the balance of a row this transaction has locked
    async fn set_balance(&mut self, address: &str, new_balance: i64) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;

    /// Roll back a transaction whose last statement may still be running,
    /// e.g. a lock wait abandoned on cancellation. Must not wait for that
    /// statement to finish on its own.
    async fn abort(self) -> Result<(), StoreError>;
}
