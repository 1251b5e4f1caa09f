//! Wallet ledger
//!
//! Address-keyed balance records and the transactional store contract the
//! transfer engine runs against.
//!
//! - [`store`] - `WalletStore` / `WalletTx` traits and `StoreError`
//! - [`postgres`] - PostgreSQL implementation (`SELECT ... FOR UPDATE`)
//! - [`memory`] - in-process implementation with per-row async locks

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
pub mod validation;

pub use memory::MemoryWalletStore;
pub use models::Wallet;
pub use postgres::PgWalletStore;
pub use store::{StoreError, WalletStore, WalletTx};
pub use validation::{ValidationError, WalletAddress};
