//! Queue processor: one drain of one account's pending adjustments.
//!
//! The drain itself is the ledger store's atomic `drain_and_apply`. This
//! wrapper races it against shutdown, classifies the result into a
//! [`Settlement`] and logs it. A drain interrupted by shutdown is dropped
//! before commit, so the store rolls it back and the queue stays intact.

use std::sync::Arc;

use tally_core::ledger::{LedgerError, LedgerStore};
use tally_core::types::DbId;
use tokio_util::sync::CancellationToken;

use super::dispatch::{DispatchGuard, Settlement};

/// Runs queue drains against a shared ledger store.
pub struct QueueProcessor {
    store: Arc<dyn LedgerStore>,
}

impl QueueProcessor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Drain the account's queue once.
    ///
    /// Callers must hold the account's [`DispatchGuard`]; use
    /// [`run`](Self::run) to drain and retire in one step.
    pub async fn process(&self, account_id: DbId, cancel: &CancellationToken) -> Settlement {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(account_id, "Queue drain cancelled by shutdown");
                return Settlement::Cancelled;
            }
            result = self.store.drain_and_apply(account_id) => result,
        };

        match result {
            Ok(report) => {
                if report.is_noop() {
                    tracing::trace!(account_id, "Queue already empty");
                } else {
                    tracing::debug!(
                        account_id,
                        applied = report.applied,
                        sum = %report.sum,
                        balance = %report.balance,
                        "Queue drained",
                    );
                }
                Settlement::Applied(report)
            }
            Err(LedgerError::InsufficientFunds(_)) => {
                tracing::info!(account_id, "not enough funds in the balance");
                Settlement::InsufficientFunds
            }
            Err(e) => {
                tracing::warn!(account_id, error = %e, "Processing adjustment queue failed");
                Settlement::Failed(e.to_string())
            }
        }
    }

    /// Drain the guarded account and retire the guard with the outcome.
    pub async fn run(&self, guard: DispatchGuard, cancel: &CancellationToken) -> Settlement {
        let outcome = self.process(guard.account_id(), cancel).await;
        guard.retire(outcome)
    }
}
