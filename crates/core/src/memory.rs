//! In-process [`LedgerStore`] backed by a mutex-guarded map.
//!
//! Used by the settlement engine tests.
//! Every operation holds the single lock for its whole duration, which makes
//! `drain_and_apply` trivially atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::ledger::{DrainReport, LedgerError, LedgerStore};
use crate::types::{Amount, DbId};

#[derive(Debug)]
struct QueuedEntry {
    account_id: DbId,
    delta: Amount,
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<DbId, Amount>,
    /// Pending adjustments keyed by sequence id.
    queue: BTreeMap<DbId, QueuedEntry>,
    next_account_id: DbId,
    next_seq: DbId,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.closed {
            return Err(LedgerError::Closed);
        }
        Ok(())
    }
}

/// A thread-safe in-memory ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with the given opening balance.
    pub async fn create_account(&self, opening_balance: Amount) -> Result<DbId, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::Storage(
                "opening balance must not be negative".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.next_account_id += 1;
        let id = state.next_account_id;
        state.balances.insert(id, opening_balance);
        Ok(id)
    }

    pub async fn balance(&self, account_id: DbId) -> Option<Amount> {
        self.state.lock().await.balances.get(&account_id).copied()
    }

    /// Number of adjustments still queued for `account_id`.
    pub async fn pending(&self, account_id: DbId) -> usize {
        self.state
            .lock()
            .await
            .queue
            .values()
            .filter(|e| e.account_id == account_id)
            .count()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn append_adjustment(&self, account_id: DbId, delta: Amount) -> Result<DbId, LedgerError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        if !state.balances.contains_key(&account_id) {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.queue.insert(seq, QueuedEntry { account_id, delta });
        Ok(seq)
    }

    async fn drain_and_apply(&self, account_id: DbId) -> Result<DrainReport, LedgerError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        let balance = *state
            .balances
            .get(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let (ids, sum) = state
            .queue
            .iter()
            .filter(|(_, e)| e.account_id == account_id)
            .fold((Vec::new(), Decimal::ZERO), |(mut ids, sum), (id, e)| {
                ids.push(*id);
                (ids, sum + e.delta)
            });

        if ids.is_empty() {
            return Ok(DrainReport::empty(account_id, balance));
        }

        let new_balance = balance + sum;
        if new_balance < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds(account_id));
        }

        state.balances.insert(account_id, new_balance);
        for id in &ids {
            state.queue.remove(id);
        }

        Ok(DrainReport {
            account_id,
            applied: ids.len(),
            sum,
            balance: new_balance,
        })
    }

    async fn accounts_with_pending_queue(&self) -> Result<Vec<DbId>, LedgerError> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        let mut accounts: Vec<DbId> = state.queue.values().map(|e| e.account_id).collect();
        accounts.sort_unstable();
        accounts.dedup();
        Ok(accounts)
    }

    async fn close(&self) -> Result<(), LedgerError> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    use super::*;

    #[tokio::test]
    async fn draining_an_empty_queue_is_a_noop() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_account(dec!(10)).await.unwrap();

        let report = ledger.drain_and_apply(id).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(report.balance, dec!(10));
    }

    #[tokio::test]
    async fn drain_applies_sum_and_clears_queue() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_account(dec!(100)).await.unwrap();
        ledger.append_adjustment(id, dec!(50)).await.unwrap();
        ledger.append_adjustment(id, dec!(-20.5)).await.unwrap();

        let report = ledger.drain_and_apply(id).await.unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.sum, dec!(29.5));
        assert_eq!(report.balance, dec!(129.5));
        assert_eq!(ledger.pending(id).await, 0);
    }

    #[tokio::test]
    async fn overdraft_leaves_balance_and_queue_untouched() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_account(dec!(100)).await.unwrap();
        ledger.append_adjustment(id, dec!(-120)).await.unwrap();

        let err = ledger.drain_and_apply(id).await.unwrap_err();
        assert_eq!(err, LedgerError::InsufficientFunds(id));
        assert_eq!(ledger.balance(id).await, Some(dec!(100)));
        assert_eq!(ledger.pending(id).await, 1);
    }

    #[tokio::test]
    async fn drain_only_touches_its_own_account() {
        let ledger = InMemoryLedger::new();
        let a = ledger.create_account(dec!(0)).await.unwrap();
        let b = ledger.create_account(dec!(0)).await.unwrap();
        ledger.append_adjustment(a, dec!(5)).await.unwrap();
        ledger.append_adjustment(b, dec!(7)).await.unwrap();

        ledger.drain_and_apply(a).await.unwrap();
        assert_eq!(ledger.balance(a).await, Some(dec!(5)));
        assert_eq!(ledger.balance(b).await, Some(dec!(0)));
        assert_eq!(ledger.accounts_with_pending_queue().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn append_to_unknown_account_fails() {
        let ledger = InMemoryLedger::new();
        assert_matches!(
            ledger.append_adjustment(99, dec!(1)).await,
            Err(LedgerError::AccountNotFound(99))
        );
    }

    #[tokio::test]
    async fn closed_ledger_rejects_operations() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_account(dec!(0)).await.unwrap();
        ledger.close().await.unwrap();
        assert_matches!(ledger.append_adjustment(id, dec!(1)).await, Err(LedgerError::Closed));
        assert_matches!(ledger.drain_and_apply(id).await, Err(LedgerError::Closed));
    }
}
