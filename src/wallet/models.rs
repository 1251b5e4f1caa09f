//! Data models for the wallet ledger

use serde::Serialize;
use std::fmt;

/// A named balance record, keyed by address
///
/// `id` is assigned by the store on creation and is only used to order lock
/// acquisition. `balance` is the only field that ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: i64,
    pub address: String,
    pub balance: i64,
}

impl Wallet {
    pub fn new(id: i64, address: impl Into<String>, balance: i64) -> Self {
        Self {
            id,
            address: address.into(),
            balance,
        }
    }

    /// Whether this wallet can cover a debit of `amount`
    #[inline]
    pub fn can_cover(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wallet[{}] {} balance={}",
            self.id, self.address, self.balance
        )
    }
}
