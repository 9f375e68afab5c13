//! Submit-and-wait settlement of balance adjustments.
//!
//! [`Settler::submit`] appends the caller's delta to the account's queue and
//! returns once a drain that is guaranteed to have seen that delta has
//! finished. Drains run on spawned tasks, so a caller that goes away (client
//! disconnect, request timeout) never aborts a drain other callers wait on.

use std::sync::Arc;

use tally_core::error::CoreError;
use tally_core::ledger::{DrainReport, LedgerStore};
use tally_core::types::{Amount, DbId};
use tally_core::validation::{validate_account_id, validate_amount};
use tokio_util::sync::CancellationToken;

use super::dispatch::{Dispatch, DispatchGuard, DispatchTable, Settlement};
use super::processor::QueueProcessor;

/// Outcome of one acquire-or-join round.
enum Round {
    /// This caller ran the drain.
    Owned(Settlement),
    /// This caller waited on somebody else's drain.
    Joined(Settlement),
}

/// Entry point for settling adjustments. Cheap to clone.
#[derive(Clone)]
pub struct Settler {
    store: Arc<dyn LedgerStore>,
    dispatch: Arc<DispatchTable>,
    processor: Arc<QueueProcessor>,
    cancel: CancellationToken,
}

impl Settler {
    /// Build a settler over `store`. `cancel` is the process shutdown token:
    /// firing it aborts in-flight drains and releases waiting callers.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        dispatch: Arc<DispatchTable>,
        cancel: CancellationToken,
    ) -> Self {
        let processor = Arc::new(QueueProcessor::new(Arc::clone(&store)));
        Self {
            store,
            dispatch,
            processor,
            cancel,
        }
    }

    pub fn dispatch(&self) -> &Arc<DispatchTable> {
        &self.dispatch
    }

    /// Credit `amount` to the account and wait for settlement.
    pub async fn deposit(&self, account_id: DbId, amount: Amount) -> Result<DrainReport, CoreError> {
        let amount = validate_amount(amount)?;
        self.submit(account_id, amount).await
    }

    /// Debit `amount` from the account and wait for settlement.
    pub async fn withdraw(&self, account_id: DbId, amount: Amount) -> Result<DrainReport, CoreError> {
        let amount = validate_amount(amount)?;
        self.submit(account_id, -amount).await
    }

    /// Queue a signed `delta` and wait until it is settled.
    ///
    /// Returns the report of the drain that settled it. Errors:
    /// - [`CoreError::Validation`] for a bad account id, or a delta that is
    ///   zero, out of range or too precise, before anything is queued.
    /// - [`CoreError::NotFound`] if the account does not exist.
    /// - [`CoreError::InsufficientFunds`] if the account's queue would
    ///   overdraw it. The delta stays queued.
    /// - [`CoreError::Internal`] on storage failure or shutdown.
    pub async fn submit(&self, account_id: DbId, delta: Amount) -> Result<DrainReport, CoreError> {
        validate_account_id(account_id)?;
        let magnitude = validate_amount(delta.abs())?;
        let delta = if delta.is_sign_negative() {
            -magnitude
        } else {
            magnitude
        };

        let seq = self.store.append_adjustment(account_id, delta).await?;
        tracing::debug!(account_id, seq, delta = %delta, "Adjustment queued");

        let outcome = match self.round(account_id).await {
            Round::Owned(outcome) => outcome,
            Round::Joined(Settlement::Cancelled) => Settlement::Cancelled,
            // The joined drain may have read the queue before our append
            // landed. Any drain started from here on was created after the
            // append, so one more round is guaranteed to cover it.
            Round::Joined(_) => match self.round(account_id).await {
                Round::Owned(outcome) | Round::Joined(outcome) => outcome,
            },
        };

        into_result(account_id, outcome)
    }

    /// Drain the account's queue unless a drain is already in flight.
    ///
    /// Returns `None` when another caller owns the drain. Used by the
    /// background scanner, which does not need to wait on other drains.
    pub async fn settle_pending(&self, account_id: DbId) -> Option<Settlement> {
        match self.dispatch.acquire_or_join(account_id) {
            Dispatch::Owner(guard) => Some(self.drive(guard).await),
            Dispatch::Joined(_) => None,
        }
    }

    async fn round(&self, account_id: DbId) -> Round {
        match self.dispatch.acquire_or_join(account_id) {
            Dispatch::Owner(guard) => Round::Owned(self.drive(guard).await),
            Dispatch::Joined(handle) => Round::Joined(handle.wait(&self.cancel).await),
        }
    }

    /// Run the drain for `guard` on its own task and wait for it.
    async fn drive(&self, guard: DispatchGuard) -> Settlement {
        let account_id = guard.account_id();
        let processor = Arc::clone(&self.processor);
        let cancel = self.cancel.clone();

        match tokio::spawn(async move { processor.run(guard, &cancel).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The guard was dropped with the task, which already released
                // any waiters.
                tracing::error!(account_id, error = %e, "Queue drain task failed");
                Settlement::Failed(format!("queue drain task failed: {e}"))
            }
        }
    }
}

fn into_result(account_id: DbId, outcome: Settlement) -> Result<DrainReport, CoreError> {
    match outcome {
        Settlement::Applied(report) => Ok(report),
        Settlement::InsufficientFunds => Err(CoreError::InsufficientFunds(account_id)),
        Settlement::Failed(reason) => Err(CoreError::Internal(format!(
            "settling account {account_id}: {reason}"
        ))),
        Settlement::Cancelled => Err(CoreError::Internal(format!(
            "settling account {account_id}: interrupted by shutdown"
        ))),
    }
}
