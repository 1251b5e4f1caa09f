//! In-Memory Wallet Store
//!
//! Same transactional contract as the PostgreSQL store, kept in process:
//! - every row owns an async mutex; `lock_for_update` holds its owned guard
//!   inside the transaction until commit or rollback
//! - writes are buffered per transaction and applied at commit
//! - commit conflicts can be injected to drive the engine's retry path
//!
//! Used by tests and local runs without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::models::Wallet;
use super::store::{StoreError, WalletStore, WalletTx};
use super::validation::WalletAddress;

struct Row {
    id: i64,
    balance: i64,
    lock: Arc<RowLock<()>>,
}

#[derive(Default)]
struct Inner {
    /// Committed state. Never held across an await.
    rows: Mutex<HashMap<String, Row>>,
    next_id: AtomicI64,
    fail_commits: AtomicUsize,
    unavailable: AtomicBool,
}

impl Inner {
    fn rows(&self) -> Result<MutexGuard<'_, HashMap<String, Row>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Unavailable("wallet table poisoned".to_string()))
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    fn committed(&self, address: &str) -> Result<Option<Wallet>, StoreError> {
        let rows = self.rows()?;
        Ok(rows
            .get(address)
            .map(|row| Wallet::new(row.id, address, row.balance)))
    }
}

/// In-process wallet store with real per-row exclusive locks
#[derive(Clone, Default)]
pub struct MemoryWalletStore {
    inner: Arc<Inner>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a conflict
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Simulate the backing store going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Committed balances by address
    pub fn balances(&self) -> Result<HashMap<String, i64>, StoreError> {
        let rows = self.inner.rows()?;
        Ok(rows
            .iter()
            .map(|(address, row)| (address.clone(), row.balance))
            .collect())
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    type Tx = MemoryWalletTx;

    async fn begin(&self) -> Result<MemoryWalletTx, StoreError> {
        self.inner.check_available()?;
        Ok(MemoryWalletTx {
            inner: self.inner.clone(),
            held: HashMap::new(),
            pending: HashMap::new(),
        })
    }

    async fn lookup(&self, address: &str) -> Result<Option<Wallet>, StoreError> {
        self.inner.check_available()?;
        self.inner.committed(address)
    }

    async fn create(
        &self,
        address: &WalletAddress,
        initial_balance: i64,
    ) -> Result<Wallet, StoreError> {
        self.inner.check_available()?;
        if initial_balance < 0 {
            return Err(StoreError::CheckViolation(format!(
                "negative balance for {}",
                address
            )));
        }

        let mut rows = self.inner.rows()?;
        if rows.contains_key(address.as_str()) {
            return Err(StoreError::AlreadyExists(address.to_string()));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        rows.insert(
            address.to_string(),
            Row {
                id,
                balance: initial_balance,
                lock: Arc::new(RowLock::new(())),
            },
        );

        Ok(Wallet::new(id, address.as_str(), initial_balance))
    }

    async fn total_balance(&self) -> Result<i64, StoreError> {
        self.inner.check_available()?;
        let rows = self.inner.rows()?;
        // Same outcome as PostgreSQL's bigint out of range on SUM
        let total = rows
            .values()
            .try_fold(0i64, |acc, row| acc.checked_add(row.balance));
        total.ok_or_else(|| StoreError::Unavailable("total balance out of range".to_string()))
    }
}

/// Open in-memory transaction
///
/// Dropping it releases every held row lock and discards buffered writes.
pub struct MemoryWalletTx {
    inner: Arc<Inner>,
    held: HashMap<String, OwnedMutexGuard<()>>,
    pending: HashMap<String, i64>,
}

impl MemoryWalletTx {
    fn overlay(&self, wallet: Option<Wallet>) -> Option<Wallet> {
        wallet.map(|mut w| {
            if let Some(balance) = self.pending.get(&w.address) {
                w.balance = *balance;
            }
            w
        })
    }
}

#[async_trait]
impl WalletTx for MemoryWalletTx {
    async fn lookup(&mut self, address: &str) -> Result<Option<Wallet>, StoreError> {
        self.inner.check_available()?;
        let wallet = self.inner.committed(address)?;
        Ok(self.overlay(wallet))
    }

    async fn lock_for_update(&mut self, address: &str) -> Result<Option<Wallet>, StoreError> {
        self.inner.check_available()?;

        if !self.held.contains_key(address) {
            let lock = {
                let rows = self.inner.rows()?;
                match rows.get(address) {
                    Some(row) => row.lock.clone(),
                    None => return Ok(None),
                }
            };

            let guard = lock.lock_owned().await;
            self.held.insert(address.to_string(), guard);
        }

        // Read after acquiring, the previous holder may have committed
        let wallet = self.inner.committed(address)?;
        Ok(self.overlay(wallet))
    }

    async fn set_balance(&mut self, address: &str, new_balance: i64) -> Result<(), StoreError> {
        if !self.held.contains_key(address) {
            return Err(StoreError::NotLocked(address.to_string()));
        }
        if new_balance < 0 {
            return Err(StoreError::CheckViolation(format!(
                "negative balance for {}",
                address
            )));
        }

        self.pending.insert(address.to_string(), new_balance);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.inner.check_available()?;

        let injected = self
            .inner
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        {
            let mut rows = self.inner.rows()?;
            for (address, balance) in &self.pending {
                if let Some(row) = rows.get_mut(address) {
                    row.balance = *balance;
                }
            }
        }

        // Row locks are released only once the writes are visible
        drop(self.held);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }

    // An abandoned lock_owned() wait is dropped with its future
    async fn abort(self) -> Result<(), StoreError> {
        self.rollback().await
    }
}
