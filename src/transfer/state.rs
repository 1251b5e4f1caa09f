//! Transfer call lifecycle
//!
//! Per-call states, traced as the engine moves through them. Nothing is
//! persisted: a transfer either commits in one store transaction or leaves no
//! trace.

use std::fmt;

use super::error::TransferError;

/// Transfer states
///
/// ```text
/// VALIDATING → REJECTED
///     ↓
/// LOCKING ⟲ (conflict, retry)
///     ↓
/// MUTATING → COMMITTING → SUCCEEDED
///     ↓           ↓
///        ROLLED_BACK          FAILED (retries exhausted / store down)
/// ```
///
/// Terminal states: SUCCEEDED, REJECTED, ROLLED_BACK, FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Input checks, before any transaction exists
    Validating,

    /// Inside the transaction, resolving and locking wallet rows
    Locking,

    /// Both rows locked, balances being checked and written
    Mutating,

    /// Writes staged, commit in flight
    Committing,

    /// Terminal: committed
    Succeeded,

    /// Terminal: refused before any transaction was opened
    Rejected,

    /// Terminal: transaction aborted, nothing written
    RolledBack,

    /// Terminal: store failure or retry budget exhausted
    Failed,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Succeeded
                | TransferState::Rejected
                | TransferState::RolledBack
                | TransferState::Failed
        )
    }

    /// Whether a store transaction may be open in this state
    #[inline]
    pub fn in_transaction(&self) -> bool {
        matches!(
            self,
            TransferState::Locking | TransferState::Mutating | TransferState::Committing
        )
    }

    /// Terminal state an error leads to, given where it was raised
    pub fn after_error(from: TransferState, error: &TransferError) -> TransferState {
        match error {
            TransferError::Transient(_) | TransferError::StoreUnavailable(_) => {
                TransferState::Failed
            }
            _ if from.in_transaction() => TransferState::RolledBack,
            _ => TransferState::Rejected,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Validating => "VALIDATING",
            TransferState::Locking => "LOCKING",
            TransferState::Mutating => "MUTATING",
            TransferState::Committing => "COMMITTING",
            TransferState::Succeeded => "SUCCEEDED",
            TransferState::Rejected => "REJECTED",
            TransferState::RolledBack => "ROLLED_BACK",
            TransferState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
