//! Periodic sweep of accounts with pending adjustments.
//!
//! Adjustments that no caller is waiting on any more (a request that timed
//! out, a drain that failed, a withdrawal rejected until a later deposit)
//! stay queued. The scanner finds every account with a non-empty queue and
//! drains it through the same dispatch table callers use, so it never runs
//! a second drain next to one already in flight.

use std::sync::Arc;
use std::time::Duration;

use tally_core::ledger::{LedgerError, LedgerStore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::dispatch::Settlement;
use crate::engine::settlement::Settler;

/// Default sweep period.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

/// Tally of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Accounts found with pending adjustments.
    pub scanned: usize,
    pub applied: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Accounts already being drained by somebody else.
    pub skipped: usize,
}

impl SweepSummary {
    fn record(&mut self, outcome: Option<Settlement>) {
        match outcome {
            Some(Settlement::Applied(_)) => self.applied += 1,
            Some(Settlement::InsufficientFunds) => self.rejected += 1,
            Some(Settlement::Failed(_)) | Some(Settlement::Cancelled) => self.failed += 1,
            None => self.skipped += 1,
        }
    }
}

pub struct QueueScanner {
    store: Arc<dyn LedgerStore>,
    settler: Settler,
    interval: Duration,
}

impl QueueScanner {
    pub fn new(store: Arc<dyn LedgerStore>, settler: Settler, interval: Duration) -> Self {
        Self {
            store,
            settler,
            interval,
        }
    }

    /// Run sweeps every `interval` until `cancel` is triggered.
    ///
    /// A sweep always finishes before the next one starts. A slow sweep
    /// pushes the schedule back instead of queueing up catch-up ticks.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Queue scanner started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queue scanner stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(summary) if summary.scanned > 0 => {
                            tracing::info!(
                                scanned = summary.scanned,
                                applied = summary.applied,
                                rejected = summary.rejected,
                                failed = summary.failed,
                                skipped = summary.skipped,
                                "Queue scanner: sweep finished"
                            );
                        }
                        Ok(_) => {
                            tracing::trace!("Queue scanner: nothing pending");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Queue scanner: listing pending accounts failed");
                        }
                    }
                }
            }
        }
    }

    /// Drain every account that currently has pending adjustments.
    ///
    /// Accounts are drained concurrently. Only a failure to list the
    /// accounts is returned as an error; per-account failures are counted.
    pub async fn sweep_once(&self) -> Result<SweepSummary, LedgerError> {
        let accounts = self.store.accounts_with_pending_queue().await?;
        let mut summary = SweepSummary {
            scanned: accounts.len(),
            ..SweepSummary::default()
        };

        let mut sweeps = JoinSet::new();
        for account_id in accounts {
            let settler = self.settler.clone();
            sweeps.spawn(async move { (account_id, settler.settle_pending(account_id).await) });
        }

        while let Some(joined) = sweeps.join_next().await {
            match joined {
                Ok((account_id, outcome)) => {
                    let outcome_label = outcome.as_ref().map_or("skipped", Settlement::label);
                    tracing::debug!(account_id, outcome = outcome_label, "Queue scanner: account swept");
                    summary.record(outcome);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Queue scanner: sweep task failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
