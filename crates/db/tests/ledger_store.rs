//! Integration tests for `PgLedgerStore` against a real database.
//!
//! Exercises the queue drain transaction:
//! - Sum-and-clear of queued adjustments
//! - Overdraft rejection with full rollback
//! - Empty-queue no-op
//! - Adjustments appended after a drain stay queued
//! - Concurrent drains never double-apply
//! - A drain dropped mid-transaction leaves nothing behind

use std::time::Duration;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use tally_core::ledger::{LedgerError, LedgerStore};
use tally_db::repositories::{AccountRepo, AdjustmentRepo};
use tally_db::PgLedgerStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn account_with_balance(pool: &PgPool, store: &PgLedgerStore, opening: Decimal) -> i64 {
    let account = AccountRepo::create(pool).await.unwrap();
    if opening > Decimal::ZERO {
        store.append_adjustment(account.id, opening).await.unwrap();
        store.drain_and_apply(account.id).await.unwrap();
    }
    account.id
}

async fn balance_of(pool: &PgPool, id: i64) -> Decimal {
    AccountRepo::find_by_id(pool, id).await.unwrap().unwrap().balance
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn drain_applies_sum_and_clears_queue(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let id = account_with_balance(&pool, &store, dec!(100)).await;

    store.append_adjustment(id, dec!(50)).await.unwrap();
    store.append_adjustment(id, dec!(-30.25)).await.unwrap();

    let report = store.drain_and_apply(id).await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.sum, dec!(19.75));
    assert_eq!(report.balance, dec!(119.75));

    assert_eq!(balance_of(&pool, id).await, dec!(119.75));
    assert!(AdjustmentRepo::list_for_account(&pool, id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn drain_of_empty_queue_is_noop(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let id = account_with_balance(&pool, &store, dec!(12)).await;

    let report = store.drain_and_apply(id).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(report.balance, dec!(12));

    // Draining again is still a no-op.
    let again = store.drain_and_apply(id).await.unwrap();
    assert!(again.is_noop());
    assert_eq!(balance_of(&pool, id).await, dec!(12));
}

#[sqlx::test(migrations = "./migrations")]
async fn overdraft_is_rejected_and_rolled_back(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let id = account_with_balance(&pool, &store, dec!(0)).await;

    store.append_adjustment(id, dec!(40)).await.unwrap();
    store.append_adjustment(id, dec!(60)).await.unwrap();
    store.drain_and_apply(id).await.unwrap();

    store.append_adjustment(id, dec!(-150)).await.unwrap();
    let err = store.drain_and_apply(id).await.unwrap_err();
    assert_eq!(err, LedgerError::InsufficientFunds(id));

    // Balance untouched, the rejected adjustment is still queued.
    assert_eq!(balance_of(&pool, id).await, dec!(100));
    let queued = AdjustmentRepo::list_for_account(&pool, id).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].delta, dec!(-150));

    // A compensating deposit lets the whole queue drain.
    store.append_adjustment(id, dec!(75)).await.unwrap();
    let report = store.drain_and_apply(id).await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.balance, dec!(25));
}

#[sqlx::test(migrations = "./migrations")]
async fn drain_of_unknown_account_reports_not_found(pool: PgPool) {
    let store = PgLedgerStore::new(pool);
    assert_matches!(
        store.drain_and_apply(424242).await,
        Err(LedgerError::AccountNotFound(424242))
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn append_to_unknown_account_reports_not_found(pool: PgPool) {
    let store = PgLedgerStore::new(pool);
    assert_matches!(
        store.append_adjustment(424242, dec!(1)).await,
        Err(LedgerError::AccountNotFound(424242))
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_drains_never_double_apply(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let id = account_with_balance(&pool, &store, dec!(0)).await;

    for _ in 0..20 {
        store.append_adjustment(id, dec!(5)).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.drain_and_apply(id).await }));
    }

    let mut applied = 0;
    for handle in handles {
        applied += handle.await.unwrap().unwrap().applied;
    }

    assert_eq!(applied, 20);
    assert_eq!(balance_of(&pool, id).await, dec!(100));
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn pending_accounts_lists_each_account_once(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let a = AccountRepo::create(&pool).await.unwrap().id;
    let b = AccountRepo::create(&pool).await.unwrap().id;
    let _idle = AccountRepo::create(&pool).await.unwrap().id;

    store.append_adjustment(a, dec!(1)).await.unwrap();
    store.append_adjustment(a, dec!(2)).await.unwrap();
    store.append_adjustment(b, dec!(3)).await.unwrap();

    let mut pending = store.accounts_with_pending_queue().await.unwrap();
    pending.sort_unstable();
    assert_eq!(pending, vec![a, b]);

    store.drain_and_apply(a).await.unwrap();
    assert_eq!(store.accounts_with_pending_queue().await.unwrap(), vec![b]);
}

#[sqlx::test(migrations = "./migrations")]
async fn closed_store_reports_closed(pool: PgPool) {
    let store = PgLedgerStore::new(pool);
    store.close().await.unwrap();
    assert_matches!(store.accounts_with_pending_queue().await, Err(LedgerError::Closed));
}

// ---------------------------------------------------------------------------
// Abandoned drain
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn drain_dropped_mid_transaction_is_rolled_back(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let id = account_with_balance(&pool, &store, dec!(40)).await;
    store.append_adjustment(id, dec!(15)).await.unwrap();
    store.append_adjustment(id, dec!(-5)).await.unwrap();

    // Hold the account row so the drain locks the queue and then blocks on
    // its balance update.
    let mut blocker = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .execute(&mut *blocker)
        .await
        .unwrap();

    let drain = tokio::time::timeout(Duration::from_millis(300), store.drain_and_apply(id)).await;
    assert!(drain.is_err(), "drain finished while the account row was locked");

    blocker.rollback().await.unwrap();

    assert_eq!(balance_of(&pool, id).await, dec!(40));
    assert_eq!(AdjustmentRepo::list_for_account(&pool, id).await.unwrap().len(), 2);

    // The queue is intact and the next drain applies it exactly once.
    let report = store.drain_and_apply(id).await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.balance, dec!(50));
    assert_eq!(balance_of(&pool, id).await, dec!(50));
}
