//! Wallet Transfer
//!
//! Atomic debit/credit between two wallets under concurrent access.
//!
//! # Safety Invariants
//!
//! 1. **Non-negativity**: a debit that would take the sender below zero is
//!    rejected under the row lock, before anything is written
//! 2. **Conservation**: debit and credit commit in the same transaction, or
//!    neither does
//! 3. **Lock Order**: rows are always locked by ascending wallet id, so
//!    opposite-direction transfers on the same pair cannot deadlock
//! 4. **No Implicit Wallets**: unknown sender or recipient is an error; the
//!    transfer path never creates wallets
//!
//! Isolation comes from the store's row locks, never from an in-process
//! mutex: callers may be separate processes sharing one database.

pub mod engine;
pub mod error;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use engine::TransferEngine;
pub use error::TransferError;
pub use state::TransferState;
pub use types::{RetryPolicy, TransferRequest};
