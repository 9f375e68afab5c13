//! PostgreSQL-backed [`LedgerStore`].
//!
//! The queue drain runs as a single transaction:
//!
//! 1. lock and read the account's queued adjustments,
//! 2. add their sum to the balance (the CHECK constraint rejects overdrafts),
//! 3. delete exactly the adjustments that were read,
//! 4. commit.
//!
//! Any early return drops the `sqlx::Transaction`, which rolls it back.
//! Adjustments appended after step 1 are not visible to this drain and stay
//! queued for the next one.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tally_core::ledger::{DrainReport, LedgerError, LedgerStore};
use tally_core::types::{Amount, DbId};

use crate::repositories::account_repo::BALANCE_CONSTRAINT;
use crate::repositories::{AccountRepo, AdjustmentRepo};

/// PostgreSQL SQLSTATE for `check_violation`.
const CHECK_VIOLATION: &str = "23514";

/// PostgreSQL SQLSTATE for `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Ledger store over a shared, bounded connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append_adjustment(&self, account_id: DbId, delta: Amount) -> Result<DbId, LedgerError> {
        match AdjustmentRepo::append(&self.pool, account_id, delta).await {
            Ok(row) => Ok(row.id),
            Err(e) if is_violation(&e, FOREIGN_KEY_VIOLATION, None) => {
                Err(LedgerError::AccountNotFound(account_id))
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn drain_and_apply(&self, account_id: DbId) -> Result<DrainReport, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let queued = AdjustmentRepo::lock_for_account(&mut *tx, account_id)
            .await
            .map_err(storage_error)?;

        if queued.is_empty() {
            let balance = AccountRepo::balance(&mut *tx, account_id)
                .await
                .map_err(storage_error)?
                .ok_or(LedgerError::AccountNotFound(account_id))?;
            tx.commit().await.map_err(storage_error)?;
            return Ok(DrainReport::empty(account_id, balance));
        }

        let sum: Decimal = queued.iter().map(|q| q.delta).sum();
        let ids: Vec<DbId> = queued.iter().map(|q| q.id).collect();

        let balance = match AccountRepo::add_to_balance(&mut *tx, account_id, sum).await {
            Ok(Some(balance)) => balance,
            Ok(None) => return Err(LedgerError::AccountNotFound(account_id)),
            Err(e) if is_violation(&e, CHECK_VIOLATION, Some(BALANCE_CONSTRAINT)) => {
                return Err(LedgerError::InsufficientFunds(account_id));
            }
            Err(e) => return Err(storage_error(e)),
        };

        let deleted = AdjustmentRepo::delete_by_ids(&mut *tx, &ids)
            .await
            .map_err(storage_error)?;
        if deleted != ids.len() as u64 {
            // Rows were locked FOR UPDATE, so this means a foreign writer
            // bypassed the lock. Roll back rather than double-apply.
            return Err(LedgerError::Storage(format!(
                "expected to clear {} adjustments for account {account_id}, cleared {deleted}",
                ids.len()
            )));
        }

        tx.commit().await.map_err(storage_error)?;

        Ok(DrainReport {
            account_id,
            applied: ids.len(),
            sum,
            balance,
        })
    }

    async fn accounts_with_pending_queue(&self) -> Result<Vec<DbId>, LedgerError> {
        AdjustmentRepo::accounts_with_pending(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn close(&self) -> Result<(), LedgerError> {
        self.pool.close().await;
        tracing::info!("Database pool closed");
        Ok(())
    }
}

/// Whether `err` is a database error with the given SQLSTATE and, if
/// provided, the given constraint name.
fn is_violation(err: &sqlx::Error, code: &str, constraint: Option<&str>) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(code)
                && constraint.map_or(true, |name| db_err.constraint() == Some(name))
        }
        _ => false,
    }
}

fn storage_error(err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::PoolClosed => LedgerError::Closed,
        other => LedgerError::Storage(other.to_string()),
    }
}
