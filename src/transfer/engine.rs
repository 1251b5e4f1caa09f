//! Transfer Engine
//!
//! Moves value between two wallets in a single store transaction.
//!
//! # Protocol
//!
//! 1. Reject negative amounts; answer zero amounts with a plain read.
//! 2. Open a transaction, resolve both wallets, lock them in ascending id
//!    order, re-check existence under the lock.
//! 3. Check the sender balance, write debit and credit, commit.
//! 4. Store conflicts restart the whole transaction, up to the retry budget.
//!
//! Cancellation is honoured up to the moment commit starts. A transfer whose
//! commit has begun is never abandoned.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::state::TransferState;
use super::types::{RetryPolicy, TransferRequest, lock_order};
use crate::wallet::{Wallet, WalletAddress, WalletStore, WalletTx};

/// Outcome of the in-transaction phase
enum Staged {
    /// Nothing written (self-transfer); carries the current balance
    Unchanged(i64),
    /// Debit and credit written; carries the sender's new balance
    Debited(i64),
}

/// Transfer Engine - validates, locks, mutates, commits
pub struct TransferEngine<S: WalletStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: WalletStore> TransferEngine<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Provision a wallet. The transfer path never creates wallets.
    pub async fn create_wallet(
        &self,
        address: &str,
        initial_balance: i64,
    ) -> Result<Wallet, TransferError> {
        let address = WalletAddress::new(address)?;
        if initial_balance < 0 {
            return Err(TransferError::NegativeAmount);
        }

        let wallet = self.store.create(&address, initial_balance).await?;
        info!(
            wallet_id = wallet.id,
            address = %wallet.address,
            balance = wallet.balance,
            "Wallet provisioned"
        );
        Ok(wallet)
    }

    /// Current committed balance, no locking
    pub async fn balance_of(&self, address: &str) -> Result<i64, TransferError> {
        self.store
            .lookup(address)
            .await?
            .map(|w| w.balance)
            .ok_or_else(|| TransferError::WalletNotFound(address.to_string()))
    }

    /// Move `amount` from `sender` to `recipient`, returning the sender's
    /// balance afterwards
    pub async fn transfer(
        &self,
        cancel: &CancellationToken,
        sender: &str,
        recipient: &str,
        amount: i64,
    ) -> Result<i64, TransferError> {
        self.execute(cancel, &TransferRequest::new(sender, recipient, amount))
            .await
    }

    /// Run a transfer request to a terminal state
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        req: &TransferRequest,
    ) -> Result<i64, TransferError> {
        if req.amount < 0 {
            let e = TransferError::NegativeAmount;
            debug!(
                request = %req,
                from = %TransferState::Validating,
                state = %TransferState::after_error(TransferState::Validating, &e),
                "Transfer rejected: negative amount"
            );
            return Err(e);
        }

        if req.amount == 0 {
            return self.read_sender_balance(req).await;
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut state = TransferState::Locking;

            match self.attempt(cancel, req, &mut state).await {
                Ok(balance) => {
                    info!(
                        sender = %req.sender,
                        recipient = %req.recipient,
                        amount = req.amount,
                        sender_balance = balance,
                        attempt,
                        state = %TransferState::Succeeded,
                        "Transfer completed"
                    );
                    return Ok(balance);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts() => {
                    warn!(
                        sender = %req.sender,
                        recipient = %req.recipient,
                        attempt,
                        error = %e,
                        "Transfer conflict, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                        _ = tokio::time::sleep(self.retry.delay_after(attempt)) => {}
                    }
                }
                Err(e) => {
                    let e = match e {
                        TransferError::Transient(reason) => TransferError::Transient(format!(
                            "{} (gave up after {} attempts)",
                            reason, attempt
                        )),
                        other => other,
                    };
                    let terminal = TransferState::after_error(state, &e);

                    if terminal == TransferState::Failed {
                        error!(
                            sender = %req.sender,
                            recipient = %req.recipient,
                            amount = req.amount,
                            attempt,
                            state = %terminal,
                            error = %e,
                            "Transfer failed"
                        );
                    } else {
                        debug!(
                            sender = %req.sender,
                            recipient = %req.recipient,
                            amount = req.amount,
                            state = %terminal,
                            code = e.code(),
                            "Transfer not applied"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Zero-amount transfer: confirm the sender exists and report its balance
    async fn read_sender_balance(&self, req: &TransferRequest) -> Result<i64, TransferError> {
        let sender = self
            .store
            .lookup(&req.sender)
            .await?
            .ok_or_else(|| TransferError::SenderNotFound(req.sender.clone()))?;

        debug!(
            sender = %req.sender,
            balance = sender.balance,
            "Zero-amount transfer, nothing to move"
        );
        Ok(sender.balance)
    }

    /// One transaction, start to finish
    async fn attempt(
        &self,
        cancel: &CancellationToken,
        req: &TransferRequest,
        state: &mut TransferState,
    ) -> Result<i64, TransferError> {
        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            tx = self.store.begin() => tx?,
        };

        let staged = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            staged = Self::stage(&mut tx, req, state) => Some(staged),
        };

        let staged = match staged {
            Some(Ok(staged)) => staged,
            Some(Err(e)) => {
                Self::release(tx, req).await;
                return Err(e);
            }
            None => {
                // The dropped stage future may have left a lock wait running
                Self::abort(tx, req).await;
                return Err(TransferError::Cancelled);
            }
        };

        match staged {
            Staged::Unchanged(balance) => {
                Self::release(tx, req).await;
                Ok(balance)
            }
            Staged::Debited(balance) => {
                if cancel.is_cancelled() {
                    Self::release(tx, req).await;
                    return Err(TransferError::Cancelled);
                }

                *state = TransferState::Committing;
                tx.commit().await?;
                Ok(balance)
            }
        }
    }

    /// Lock, check and write inside an open transaction
    async fn stage(
        tx: &mut S::Tx,
        req: &TransferRequest,
        state: &mut TransferState,
    ) -> Result<Staged, TransferError> {
        if req.is_self_transfer() {
            let wallet = tx
                .lock_for_update(&req.sender)
                .await?
                .ok_or_else(|| TransferError::SenderNotFound(req.sender.clone()))?;

            *state = TransferState::Mutating;
            if !wallet.can_cover(req.amount) {
                return Err(TransferError::InsufficientBalance {
                    available: wallet.balance,
                    requested: req.amount,
                });
            }
            return Ok(Staged::Unchanged(wallet.balance));
        }

        let sender = tx
            .lookup(&req.sender)
            .await?
            .ok_or_else(|| TransferError::SenderNotFound(req.sender.clone()))?;
        let recipient = tx
            .lookup(&req.recipient)
            .await?
            .ok_or_else(|| TransferError::RecipientNotFound(req.recipient.clone()))?;

        let (first, second) = lock_order(&sender, &recipient);
        let sender_first = first.id == sender.id;
        let (first, second) = (first.address.clone(), second.address.clone());

        debug!(first = %first, second = %second, "Acquiring row locks");
        let first_locked = tx.lock_for_update(&first).await?;
        let second_locked = tx.lock_for_update(&second).await?;

        let (sender, recipient) = if sender_first {
            (first_locked, second_locked)
        } else {
            (second_locked, first_locked)
        };
        let sender = sender.ok_or_else(|| TransferError::SenderNotFound(req.sender.clone()))?;
        let recipient =
            recipient.ok_or_else(|| TransferError::RecipientNotFound(req.recipient.clone()))?;

        *state = TransferState::Mutating;
        if !sender.can_cover(req.amount) {
            return Err(TransferError::InsufficientBalance {
                available: sender.balance,
                requested: req.amount,
            });
        }

        let recipient_balance = recipient
            .balance
            .checked_add(req.amount)
            .ok_or(TransferError::BalanceOverflow)?;
        let sender_balance = sender.balance - req.amount;

        tx.set_balance(&sender.address, sender_balance).await?;
        tx.set_balance(&recipient.address, recipient_balance).await?;

        Ok(Staged::Debited(sender_balance))
    }

    async fn release(tx: S::Tx, req: &TransferRequest) {
        if let Err(e) = tx.rollback().await {
            warn!(
                sender = %req.sender,
                recipient = %req.recipient,
                error = %e,
                "Rollback failed, transaction discarded on drop"
            );
        }
    }

    async fn abort(tx: S::Tx, req: &TransferRequest) {
        if let Err(e) = tx.abort().await {
            warn!(
                sender = %req.sender,
                recipient = %req.recipient,
                error = %e,
                "Abort failed, transaction discarded on drop"
            );
        }
    }
}
