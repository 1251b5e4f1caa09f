//! Transfer Error Types
//!
//! Every failure a caller can see, as a structured value. The API layer maps
//! these to user-facing messages via `code()`.

use thiserror::Error;

use crate::wallet::{StoreError, ValidationError};

/// Transfer error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] ValidationError),

    // === Wallet Errors ===
    #[error("Sender wallet not found: {0}")]
    SenderNotFound(String),

    #[error("Recipient wallet not found: {0}")]
    RecipientNotFound(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet already exists: {0}")]
    AlreadyExists(String),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Recipient balance would overflow")]
    BalanceOverflow,

    // === Control Flow ===
    #[error("Transfer cancelled")]
    Cancelled,

    // === System Errors ===
    #[error("Transient store conflict: {0}")]
    Transient(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::NegativeAmount => "NEGATIVE_AMOUNT",
            TransferError::InvalidAddress(_) => "INVALID_ADDRESS",
            TransferError::SenderNotFound(_) => "SENDER_NOT_FOUND",
            TransferError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            TransferError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            TransferError::AlreadyExists(_) => "ALREADY_EXISTS",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::BalanceOverflow => "BALANCE_OVERFLOW",
            TransferError::Cancelled => "CANCELLED",
            TransferError::Transient(_) => "TRANSIENT",
            TransferError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Only store conflicts are retried. Business-rule failures are
    /// deterministic for the same state and never retried.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Transient(_))
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => TransferError::Transient(msg),
            StoreError::AlreadyExists(address) => TransferError::AlreadyExists(address),
            other => TransferError::StoreUnavailable(other.to_string()),
        }
    }
}
