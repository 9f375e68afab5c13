//! Test doubles for the settlement engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tally_core::ledger::{DrainReport, LedgerError, LedgerStore};
use tally_core::memory::InMemoryLedger;
use tally_core::types::{Amount, DbId};

/// Wraps an [`InMemoryLedger`], slowing drains down and recording how many
/// run at once per account.
pub struct InstrumentedLedger {
    pub inner: InMemoryLedger,
    drain_delay: Duration,
    active: Mutex<HashMap<DbId, usize>>,
    max_concurrent_per_account: AtomicUsize,
    drains: AtomicUsize,
    fail_next_drain: AtomicBool,
    fail_enumeration: AtomicBool,
}

impl InstrumentedLedger {
    pub fn new(drain_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryLedger::new(),
            drain_delay,
            active: Mutex::new(HashMap::new()),
            max_concurrent_per_account: AtomicUsize::new(0),
            drains: AtomicUsize::new(0),
            fail_next_drain: AtomicBool::new(false),
            fail_enumeration: AtomicBool::new(false),
        })
    }

    /// Highest number of simultaneous drains observed for any one account.
    pub fn max_concurrent_per_account(&self) -> usize {
        self.max_concurrent_per_account.load(Ordering::SeqCst)
    }

    pub fn drains(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    /// Make the next drain fail with a storage error.
    pub fn fail_next_drain(&self) {
        self.fail_next_drain.store(true, Ordering::SeqCst);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    fn enter(&self, account_id: DbId) {
        let mut active = self.active.lock().unwrap();
        let count = active.entry(account_id).or_insert(0);
        *count += 1;
        self.max_concurrent_per_account
            .fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, account_id: DbId) {
        let mut active = self.active.lock().unwrap();
        if let Some(count) = active.get_mut(&account_id) {
            *count -= 1;
        }
    }
}

/// Decrements the active-drain counter even if the drain future is dropped.
struct ActiveDrain<'a> {
    ledger: &'a InstrumentedLedger,
    account_id: DbId,
}

impl Drop for ActiveDrain<'_> {
    fn drop(&mut self) {
        self.ledger.leave(self.account_id);
    }
}

#[async_trait]
impl LedgerStore for InstrumentedLedger {
    async fn append_adjustment(&self, account_id: DbId, delta: Amount) -> Result<DbId, LedgerError> {
        self.inner.append_adjustment(account_id, delta).await
    }

    async fn drain_and_apply(&self, account_id: DbId) -> Result<DrainReport, LedgerError> {
        self.enter(account_id);
        let _active = ActiveDrain {
            ledger: self,
            account_id,
        };
        self.drains.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.drain_delay).await;

        if self.fail_next_drain.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Storage("connection reset".to_string()));
        }
        self.inner.drain_and_apply(account_id).await
    }

    async fn accounts_with_pending_queue(&self) -> Result<Vec<DbId>, LedgerError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("connection refused".to_string()));
        }
        self.inner.accounts_with_pending_queue().await
    }

    async fn close(&self) -> Result<(), LedgerError> {
        self.inner.close().await
    }
}
