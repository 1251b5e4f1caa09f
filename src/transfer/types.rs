//! Transfer Core Types

use std::fmt;
use std::time::Duration;

use crate::config::TransferConfig;
use crate::wallet::Wallet;

/// Transfer request from the API layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender: String,
    pub recipient: String,
    pub amount: i64,
}

impl TransferRequest {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: i64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Sender and recipient are the same wallet (exact, case-sensitive match)
    #[inline]
    pub fn is_self_transfer(&self) -> bool {
        self.sender == self.recipient
    }
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer {} -> {} amount={}",
            self.sender, self.recipient, self.amount
        )
    }
}

/// Bounded retry for store conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay, scaled linearly by attempt number
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Total attempts allowed, first try included
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before attempt `attempt + 1`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(20),
        }
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(config: &TransferConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }
}

/// Lock order for two distinct wallets: ascending surrogate id
///
/// Every transaction touching the same pair acquires the rows in the same
/// order whichever side is the sender, so no wait cycle can form.
pub fn lock_order<'a>(a: &'a Wallet, b: &'a Wallet) -> (&'a Wallet, &'a Wallet) {
    if a.id <= b.id { (a, b) } else { (b, a) }
}
