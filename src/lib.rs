//! wallet_transfer - Atomic Wallet Transfer Engine
//!
//! Moves value between address-keyed wallets stored in PostgreSQL, safely
//! under any number of concurrent callers.
//!
//! # Modules
//!
//! - [`wallet`] - Wallet model and the transactional store contract
//! - [`transfer`] - Transfer engine (validation, lock order, retries)
//! - [`db`] - Connection pool and schema bootstrap
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod transfer;
pub mod wallet;

// Convenient re-exports at crate root
pub use transfer::{RetryPolicy, TransferEngine, TransferError, TransferRequest, TransferState};
pub use wallet::{MemoryWalletStore, PgWalletStore, StoreError, Wallet, WalletStore, WalletTx};
