//! Repository for the `queued_adjustments` table.

use sqlx::{PgConnection, PgPool};
use tally_core::types::{Amount, DbId};

use crate::models::adjustment::QueuedAdjustment;

/// Column list for `queued_adjustments` queries.
const COLUMNS: &str = "id, account_id, delta, created_at";

/// Provides append, drain and enumeration operations for pending adjustments.
pub struct AdjustmentRepo;

impl AdjustmentRepo {
    /// Enqueue a signed delta for an account.
    pub async fn append(
        pool: &PgPool,
        account_id: DbId,
        delta: Amount,
    ) -> Result<QueuedAdjustment, sqlx::Error> {
        let query = format!(
            "INSERT INTO queued_adjustments (account_id, delta) VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueuedAdjustment>(&query)
            .bind(account_id)
            .bind(delta)
            .fetch_one(pool)
            .await
    }

    /// List the account's queued adjustments, locking them until the
    /// surrounding transaction ends.
    pub async fn lock_for_account(
        conn: &mut PgConnection,
        account_id: DbId,
    ) -> Result<Vec<QueuedAdjustment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queued_adjustments \
             WHERE account_id = $1 \
             ORDER BY id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, QueuedAdjustment>(&query)
            .bind(account_id)
            .fetch_all(conn)
            .await
    }

    /// Delete exactly the given adjustments. Returns the number removed.
    pub async fn delete_by_ids(conn: &mut PgConnection, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM queued_adjustments WHERE id = ANY($1)")
            .bind(ids)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Distinct accounts that hold at least one queued adjustment.
    pub async fn accounts_with_pending(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT DISTINCT account_id FROM queued_adjustments ORDER BY account_id")
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_account(
        pool: &PgPool,
        account_id: DbId,
    ) -> Result<Vec<QueuedAdjustment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queued_adjustments WHERE account_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, QueuedAdjustment>(&query)
            .bind(account_id)
            .fetch_all(pool)
            .await
    }
}
