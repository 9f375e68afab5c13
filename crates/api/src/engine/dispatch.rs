//! Per-account dispatch table.
//!
//! [`DispatchTable::acquire_or_join`] hands out exactly one
//! [`DispatchGuard`] per account at a time. Everyone else who asks while the
//! guard is alive receives a [`CompletionHandle`] for the same drain and
//! waits on it.
//!
//! A guard always resolves its handle: either explicitly through
//! [`DispatchGuard::retire`] or, if it is dropped first, from its `Drop`
//! impl with [`Settlement::Failed`]. Waiters can therefore never hang on a
//! drain that errored or panicked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tally_core::ledger::DrainReport;
use tally_core::types::DbId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Final outcome of one queue drain, shared with every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The queue was drained (possibly a no-op on an empty queue).
    Applied(DrainReport),
    /// The queue sum would overdraw the account; nothing changed.
    InsufficientFunds,
    /// Storage or processing failure; nothing changed and the queue is
    /// left for a later drain.
    Failed(String),
    /// Shutdown interrupted the drain or the wait.
    Cancelled,
}

impl Settlement {
    pub fn label(&self) -> &'static str {
        match self {
            Settlement::Applied(_) => "applied",
            Settlement::InsufficientFunds => "insufficient_funds",
            Settlement::Failed(_) => "failed",
            Settlement::Cancelled => "cancelled",
        }
    }
}

type Promise = Option<Settlement>;

struct Slot {
    generation: u64,
    rx: watch::Receiver<Promise>,
}

/// Result of [`DispatchTable::acquire_or_join`].
pub enum Dispatch {
    /// The caller owns the drain and must run it, then retire the guard.
    Owner(DispatchGuard),
    /// A drain is already in flight; wait on the handle for its outcome.
    Joined(CompletionHandle),
}

/// Sharded map from account to its in-flight drain.
///
/// Each account always lands in the same shard, so the check-and-insert in
/// [`acquire_or_join`](Self::acquire_or_join) is atomic per account while
/// unrelated accounts rarely contend on the same lock.
pub struct DispatchTable {
    shards: Box<[Mutex<HashMap<DbId, Slot>>]>,
    next_generation: AtomicU64,
}

impl DispatchTable {
    /// Create a table with `shards` shards (at least one).
    pub fn new(shards: usize) -> Arc<Self> {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Arc::new(Self {
            shards,
            next_generation: AtomicU64::new(1),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Become the owner of `account_id`'s next drain, or join the one
    /// already in flight.
    pub fn acquire_or_join(self: &Arc<Self>, account_id: DbId) -> Dispatch {
        let mut shard = self.shard(account_id);

        if let Some(slot) = shard.get(&account_id) {
            return Dispatch::Joined(CompletionHandle {
                account_id,
                rx: slot.rx.clone(),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        shard.insert(account_id, Slot { generation, rx });

        Dispatch::Owner(DispatchGuard {
            table: Arc::clone(self),
            account_id,
            generation,
            tx: Some(tx),
        })
    }

    /// Number of drains currently in flight across all shards.
    pub fn in_flight(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_in_flight(&self, account_id: DbId) -> bool {
        self.shard(account_id).contains_key(&account_id)
    }

    fn shard(&self, account_id: DbId) -> MutexGuard<'_, HashMap<DbId, Slot>> {
        let index = account_id.rem_euclid(self.shards.len() as i64) as usize;
        // The critical sections never panic mid-update, so a poisoned shard
        // still holds a consistent map.
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, account_id: DbId, generation: u64) {
        let mut shard = self.shard(account_id);
        if shard
            .get(&account_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            shard.remove(&account_id);
        }
    }
}

/// Exclusive right to drain one account's queue.
pub struct DispatchGuard {
    table: Arc<DispatchTable>,
    account_id: DbId,
    generation: u64,
    tx: Option<watch::Sender<Promise>>,
}

impl DispatchGuard {
    pub fn account_id(&self) -> DbId {
        self.account_id
    }

    /// Remove the account from the table and release every waiter with
    /// `outcome`. Returns the outcome for the owner's own use.
    pub fn retire(mut self, outcome: Settlement) -> Settlement {
        self.resolve(outcome.clone());
        outcome
    }

    fn resolve(&mut self, outcome: Settlement) {
        if let Some(tx) = self.tx.take() {
            // Unmap before waking waiters: a waiter that immediately asks
            // again must start a new drain, not join this finished one.
            self.table.remove(self.account_id, self.generation);
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(
                account_id = self.account_id,
                "Dispatch guard dropped without settling, releasing waiters",
            );
            self.resolve(Settlement::Failed("processing abandoned".to_string()));
        }
    }
}

/// A waiter's view of an in-flight drain.
pub struct CompletionHandle {
    account_id: DbId,
    rx: watch::Receiver<Promise>,
}

impl CompletionHandle {
    pub fn account_id(&self) -> DbId {
        self.account_id
    }

    /// Wait for the drain to finish, or for `cancel` to fire.
    ///
    /// A drain that finished before cancellation always wins.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Settlement {
        let outcome = tokio::select! {
            biased;
            res = self.rx.wait_for(Option::is_some) => res.ok().and_then(|v| (*v).clone()),
            () = cancel.cancelled() => return Settlement::Cancelled,
        };

        outcome.unwrap_or_else(|| Settlement::Failed("dispatch owner vanished".to_string()))
    }
}
