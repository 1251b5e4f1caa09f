//! Integration Tests for the Transfer Engine
//!
//! These tests drive the complete engine against `MemoryWalletStore`, which
//! enforces the same row-lock and commit semantics as PostgreSQL without
//! needing a live database.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::transfer::engine::TransferEngine;
use crate::transfer::error::TransferError;
use crate::transfer::types::RetryPolicy;
use crate::wallet::{MemoryWalletStore, WalletStore, WalletTx};

const WALLET_1: &str = "0x0000000000000000000000000000000000000001";
const WALLET_2: &str = "0x0000000000000000000000000000000000000002";
const WALLET_3: &str = "0x0000000000000000000000000000000000000003";

/// Helper to create an engine over a fresh in-memory store
struct TestHarness {
    engine: Arc<TransferEngine<MemoryWalletStore>>,
    store: MemoryWalletStore,
    cancel: CancellationToken,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn with_retry(retry: RetryPolicy) -> Self {
        let store = MemoryWalletStore::new();
        let engine = Arc::new(TransferEngine::new(Arc::new(store.clone()), retry));
        Self {
            engine,
            store,
            cancel: CancellationToken::new(),
        }
    }

    async fn with_wallets(wallets: &[(&str, i64)]) -> Self {
        let harness = Self::new();
        for (address, balance) in wallets {
            harness
                .engine
                .create_wallet(address, *balance)
                .await
                .unwrap();
        }
        harness
    }

    async fn transfer(&self, from: &str, to: &str, amount: i64) -> Result<i64, TransferError> {
        self.engine.transfer(&self.cancel, from, to, amount).await
    }

    async fn balance(&self, address: &str) -> i64 {
        self.engine.balance_of(address).await.unwrap()
    }

    async fn total(&self) -> i64 {
        self.store.total_balance().await.unwrap()
    }
}

// ========================================================================
// Happy Path Tests
// ========================================================================

#[tokio::test]
async fn test_successful_transfer() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 100)]).await;

    let new_balance = h.transfer(WALLET_1, WALLET_2, 200).await;

    assert_eq!(new_balance, Ok(800));
    assert_eq!(h.balance(WALLET_1).await, 800);
    assert_eq!(h.balance(WALLET_2).await, 300);
    assert_eq!(h.total().await, 1100);
}

#[tokio::test]
async fn test_transfer_entire_balance() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 250), (WALLET_2, 0)]).await;

    assert_eq!(h.transfer(WALLET_1, WALLET_2, 250).await, Ok(0));
    assert_eq!(h.balance(WALLET_1).await, 0);
    assert_eq!(h.balance(WALLET_2).await, 250);
}

#[tokio::test]
async fn test_transfer_from_higher_id_to_lower_id() {
    // Sender locked second: the returned balance must still be the sender's
    let h = TestHarness::with_wallets(&[(WALLET_1, 10), (WALLET_2, 500)]).await;

    assert_eq!(h.transfer(WALLET_2, WALLET_1, 120).await, Ok(380));
    assert_eq!(h.balance(WALLET_1).await, 130);
    assert_eq!(h.balance(WALLET_2).await, 380);
}

// ========================================================================
// Validation Tests
// ========================================================================

#[tokio::test]
async fn test_transfer_with_negative_amount() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 1000)]).await;

    assert_eq!(
        h.transfer(WALLET_1, WALLET_2, -200).await,
        Err(TransferError::NegativeAmount)
    );
    assert_eq!(h.balance(WALLET_1).await, 1000);
    assert_eq!(h.balance(WALLET_2).await, 1000);
}

#[tokio::test]
async fn test_transfer_with_zero_amount() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 100)]).await;

    assert_eq!(h.transfer(WALLET_1, WALLET_2, 0).await, Ok(1000));
    assert_eq!(h.balance(WALLET_1).await, 1000);
    assert_eq!(h.balance(WALLET_2).await, 100);
}

#[tokio::test]
async fn test_zero_amount_from_unknown_sender() {
    let h = TestHarness::with_wallets(&[(WALLET_2, 100)]).await;

    assert_eq!(
        h.transfer(WALLET_1, WALLET_2, 0).await,
        Err(TransferError::SenderNotFound(WALLET_1.to_string()))
    );
}

#[tokio::test]
async fn test_transfer_insufficient_balance() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 100), (WALLET_2, 100)]).await;

    assert_eq!(
        h.transfer(WALLET_1, WALLET_2, 200).await,
        Err(TransferError::InsufficientBalance {
            available: 100,
            requested: 200
        })
    );
    assert_eq!(h.balance(WALLET_1).await, 100);
    assert_eq!(h.balance(WALLET_2).await, 100);
}

#[tokio::test]
async fn test_transfer_to_unknown_recipient() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000)]).await;

    assert_eq!(
        h.transfer(WALLET_1, WALLET_2, 100).await,
        Err(TransferError::RecipientNotFound(WALLET_2.to_string()))
    );
    assert_eq!(h.balance(WALLET_1).await, 1000);
    // The recipient is never created implicitly
    assert!(h.store.lookup(WALLET_2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transfer_from_unknown_sender() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 100)]).await;

    assert_eq!(
        h.transfer(WALLET_3, WALLET_1, 100).await,
        Err(TransferError::SenderNotFound(WALLET_3.to_string()))
    );
    assert_eq!(h.total().await, 1100);
}

#[tokio::test]
async fn test_address_match_is_case_sensitive() {
    let h = TestHarness::with_wallets(&[("0xAbC", 100), ("0xdef", 0)]).await;

    assert_eq!(
        h.transfer("0xabc", "0xdef", 10).await,
        Err(TransferError::SenderNotFound("0xabc".to_string()))
    );
}

// ========================================================================
// Self-Transfer Tests
// ========================================================================

#[tokio::test]
async fn test_transfer_to_self() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000)]).await;

    assert_eq!(h.transfer(WALLET_1, WALLET_1, 200).await, Ok(1000));
    assert_eq!(h.balance(WALLET_1).await, 1000);
}

#[tokio::test]
async fn test_transfer_to_self_full_balance() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 300)]).await;

    assert_eq!(h.transfer(WALLET_1, WALLET_1, 300).await, Ok(300));
}

#[tokio::test]
async fn test_transfer_with_negative_amount_to_self() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000)]).await;

    assert_eq!(
        h.transfer(WALLET_1, WALLET_1, -200).await,
        Err(TransferError::NegativeAmount)
    );
    assert_eq!(h.balance(WALLET_1).await, 1000);
}

#[tokio::test]
async fn test_transfer_with_zero_amount_to_self() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000)]).await;

    assert_eq!(h.transfer(WALLET_1, WALLET_1, 0).await, Ok(1000));
    assert_eq!(h.balance(WALLET_1).await, 1000);
}

#[tokio::test]
async fn test_transfer_to_self_with_insufficient_balance() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 100)]).await;

    assert_eq!(
        h.transfer(WALLET_1, WALLET_1, 200).await,
        Err(TransferError::InsufficientBalance {
            available: 100,
            requested: 200
        })
    );
    assert_eq!(h.balance(WALLET_1).await, 100);
}

#[tokio::test]
async fn test_transfer_to_nonexistent_self() {
    let h = TestHarness::new();

    assert_eq!(
        h.transfer(WALLET_1, WALLET_1, 200).await,
        Err(TransferError::SenderNotFound(WALLET_1.to_string()))
    );
}

// ========================================================================
// Retry Tests
// ========================================================================

#[tokio::test]
async fn test_conflict_is_retried_transparently() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 0)]).await;
    h.store.fail_next_commits(2);

    assert_eq!(h.transfer(WALLET_1, WALLET_2, 100).await, Ok(900));
    // Applied exactly once despite three attempts
    assert_eq!(h.balance(WALLET_1).await, 900);
    assert_eq!(h.balance(WALLET_2).await, 100);
}

#[tokio::test]
async fn test_conflict_retries_exhausted() {
    let h = TestHarness::with_retry(RetryPolicy::new(2, Duration::ZERO));
    h.engine.create_wallet(WALLET_1, 1000).await.unwrap();
    h.engine.create_wallet(WALLET_2, 0).await.unwrap();
    h.store.fail_next_commits(10);

    let err = h.transfer(WALLET_1, WALLET_2, 100).await.unwrap_err();
    assert_eq!(err.code(), "TRANSIENT");
    assert!(err.to_string().contains("gave up after 3 attempts"));

    assert_eq!(h.balance(WALLET_1).await, 1000);
    assert_eq!(h.balance(WALLET_2).await, 0);
}

#[tokio::test]
async fn test_store_unavailable_is_not_retried() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 0)]).await;
    h.store.set_unavailable(true);

    let err = h.transfer(WALLET_1, WALLET_2, 100).await.unwrap_err();
    assert!(matches!(err, TransferError::StoreUnavailable(_)));

    h.store.set_unavailable(false);
    assert_eq!(h.total().await, 1000);
}

#[tokio::test]
async fn test_business_rule_failure_leaves_injected_conflict_untouched() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 10), (WALLET_2, 0)]).await;
    h.store.fail_next_commits(1);

    // Rejected before commit: never reaches the store's commit
    assert!(matches!(
        h.transfer(WALLET_1, WALLET_2, 100).await,
        Err(TransferError::InsufficientBalance { .. })
    ));

    // The pending conflict is consumed by the next real commit, then retried
    assert_eq!(h.transfer(WALLET_1, WALLET_2, 5).await, Ok(5));
}

// ========================================================================
// Cancellation Tests
// ========================================================================

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 0)]).await;
    h.cancel.cancel();

    assert_eq!(
        h.transfer(WALLET_1, WALLET_2, 100).await,
        Err(TransferError::Cancelled)
    );
    assert_eq!(h.balance(WALLET_1).await, 1000);
}

#[tokio::test]
async fn test_cancelled_while_blocked_on_lock() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 0)]).await;

    // Another transaction holds the sender row
    let mut blocker = h.store.begin().await.unwrap();
    blocker.lock_for_update(WALLET_1).await.unwrap().unwrap();

    let engine = h.engine.clone();
    let cancel = h.cancel.clone();
    let pending =
        tokio::spawn(async move { engine.transfer(&cancel, WALLET_1, WALLET_2, 100).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished(), "transfer must wait for the row lock");

    h.cancel.cancel();
    assert_eq!(pending.await.unwrap(), Err(TransferError::Cancelled));

    blocker.rollback().await.unwrap();
    assert_eq!(h.balance(WALLET_1).await, 1000);
    assert_eq!(h.balance(WALLET_2).await, 0);

    // Both rows were released by the cancelled transaction
    let fresh = CancellationToken::new();
    assert_eq!(
        h.engine.transfer(&fresh, WALLET_1, WALLET_2, 100).await,
        Ok(900)
    );
}

#[tokio::test]
async fn test_cancel_after_commit_has_no_effect() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 0)]).await;

    assert_eq!(h.transfer(WALLET_1, WALLET_2, 100).await, Ok(900));
    h.cancel.cancel();

    assert_eq!(h.balance(WALLET_1).await, 900);
    assert_eq!(h.balance(WALLET_2).await, 100);
}

// ========================================================================
// Concurrency Tests
// ========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bidirectional_concurrent_transfers() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 1000), (WALLET_2, 1000)]).await;

    let (e1, e2) = (h.engine.clone(), h.engine.clone());
    let (c1, c2) = (h.cancel.clone(), h.cancel.clone());

    let t1 = tokio::spawn(async move { e1.transfer(&c1, WALLET_1, WALLET_2, 100).await });
    let t2 = tokio::spawn(async move { e2.transfer(&c2, WALLET_2, WALLET_1, 150).await });

    let (r1, r2) = tokio::time::timeout(Duration::from_secs(5), async {
        (t1.await.unwrap(), t2.await.unwrap())
    })
    .await
    .expect("opposite-direction transfers must not deadlock");

    assert!(r1.is_ok());
    assert!(r2.is_ok());
    assert_eq!(h.total().await, 2000);
    assert_eq!(h.balance(WALLET_1).await, 1050);
    assert_eq!(h.balance(WALLET_2).await, 950);
}

/// Three racing transfers on a small pair, repeated. Whatever subset
/// succeeds, final balances must reflect exactly that subset.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_multiple_runs() {
    // Negative = wallet 1 pays wallet 2, positive = wallet 2 pays wallet 1
    let transfers: [i64; 3] = [-4, -7, 1];

    for _ in 0..100 {
        let h = TestHarness::with_wallets(&[(WALLET_1, 10), (WALLET_2, 10)]).await;
        let start = Arc::new(tokio::sync::Barrier::new(transfers.len()));

        let handles: Vec<_> = transfers
            .iter()
            .map(|&amount| {
                let engine = h.engine.clone();
                let cancel = h.cancel.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    if amount < 0 {
                        engine.transfer(&cancel, WALLET_1, WALLET_2, -amount).await
                    } else {
                        engine.transfer(&cancel, WALLET_2, WALLET_1, amount).await
                    }
                })
            })
            .collect();

        let mut wallet_1_received = 0;
        let mut wallet_2_received = 0;
        for (handle, amount) in handles.into_iter().zip(transfers) {
            match handle.await.unwrap() {
                Ok(_) if amount < 0 => wallet_2_received += -amount,
                Ok(_) => wallet_1_received += amount,
                Err(e) => assert!(
                    matches!(e, TransferError::InsufficientBalance { .. }),
                    "unexpected error: {e}"
                ),
            }
        }

        let w1 = h.balance(WALLET_1).await;
        let w2 = h.balance(WALLET_2).await;
        assert_eq!(w1, 10 - wallet_2_received + wallet_1_received);
        assert_eq!(w2, 10 - wallet_1_received + wallet_2_received);
        assert!(w1 >= 0);
        assert!(w2 >= 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraw_attempts() {
    let h = TestHarness::with_wallets(&[(WALLET_1, 250), (WALLET_2, 0)]).await;
    let start = Arc::new(tokio::sync::Barrier::new(5));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let engine = h.engine.clone();
            let cancel = h.cancel.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                engine.transfer(&cancel, WALLET_1, WALLET_2, 100).await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(balance) => {
                assert!(balance >= 0);
                succeeded += 1;
            }
            Err(e) => assert!(matches!(e, TransferError::InsufficientBalance { .. })),
        }
    }

    // 250 covers exactly two debits of 100
    assert_eq!(succeeded, 2);
    assert_eq!(h.balance(WALLET_1).await, 50);
    assert_eq!(h.balance(WALLET_2).await, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_pairs_do_not_block_each_other() {
    let h = TestHarness::with_wallets(&[
        (WALLET_1, 100),
        (WALLET_2, 0),
        (WALLET_3, 100),
        ("0x04", 0),
    ])
    .await;

    // Hold the first pair's rows open
    let mut blocker = h.store.begin().await.unwrap();
    blocker.lock_for_update(WALLET_1).await.unwrap();
    blocker.lock_for_update(WALLET_2).await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        h.transfer(WALLET_3, "0x04", 40),
    )
    .await
    .expect("transfer on an unrelated pair must not wait");
    assert_eq!(result, Ok(60));

    blocker.rollback().await.unwrap();
}
