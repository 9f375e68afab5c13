//! The ledger store contract consumed by the settlement engine.
//!
//! A [`LedgerStore`] owns every durable fact: account balances and each
//! account's queue of pending adjustments. The engine never reads or writes
//! balances directly; it only appends adjustments and asks the store to
//! drain an account's queue atomically.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Amount, DbId};

/// Result of one successful drain of an account's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub account_id: DbId,
    /// Number of queued adjustments folded into the balance.
    pub applied: usize,
    /// Arithmetic sum of the applied deltas.
    pub sum: Amount,
    /// Balance after the drain committed.
    pub balance: Amount,
}

impl DrainReport {
    /// Report for a drain that found nothing queued.
    pub fn empty(account_id: DbId, balance: Amount) -> Self {
        Self {
            account_id,
            applied: 0,
            sum: Decimal::ZERO,
            balance,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }
}

/// Failures reported by a [`LedgerStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The queue sum would take the balance below zero; nothing was changed.
    #[error("not enough funds in the balance of account {0}")]
    InsufficientFunds(DbId),

    #[error("account {0} does not exist")]
    AccountNotFound(DbId),

    /// Any storage or transport failure. The unit of work was rolled back.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("ledger store is closed")]
    Closed,
}

/// Durable storage of balances and pending adjustment queues.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Durably enqueue a signed delta for `account_id`.
    ///
    /// Returns the store-assigned sequence id of the new adjustment.
    async fn append_adjustment(&self, account_id: DbId, delta: Amount) -> Result<DbId, LedgerError>;

    /// Atomically sum every queued adjustment for `account_id`, add the sum to
    /// the balance, and delete exactly the adjustments that were summed.
    ///
    /// An empty queue is a successful no-op. On any error the store is left
    /// exactly as it was before the call.
    async fn drain_and_apply(&self, account_id: DbId) -> Result<DrainReport, LedgerError>;

    /// Snapshot of accounts holding at least one queued adjustment.
    async fn accounts_with_pending_queue(&self) -> Result<Vec<DbId>, LedgerError>;

    /// Release storage resources. Terminal.
    async fn close(&self) -> Result<(), LedgerError>;
}
