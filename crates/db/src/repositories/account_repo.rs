//! Repository for the `accounts` table.

use sqlx::{PgConnection, PgPool};
use tally_core::types::{Amount, DbId};

use crate::models::account::{Account, AccountOverview};

/// Column list for `accounts` queries.
const COLUMNS: &str = "id, balance, created_at, updated_at";

/// Name of the CHECK constraint that keeps balances non-negative.
pub const BALANCE_CONSTRAINT: &str = "ck_accounts_balance_non_negative";

/// Provides operations on accounts and their balances.
pub struct AccountRepo;

impl AccountRepo {
    /// Insert a new account with a zero balance.
    pub async fn create(pool: &PgPool) -> Result<Account, sqlx::Error> {
        let query = format!("INSERT INTO accounts DEFAULT VALUES RETURNING {COLUMNS}");
        sqlx::query_as::<_, Account>(&query).fetch_one(pool).await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Account>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an account along with the number of adjustments still queued.
    pub async fn overview(pool: &PgPool, id: DbId) -> Result<Option<AccountOverview>, sqlx::Error> {
        sqlx::query_as::<_, AccountOverview>(
            "SELECT a.id, a.balance, \
                    (SELECT COUNT(*) FROM queued_adjustments q WHERE q.account_id = a.id) \
                        AS pending_adjustments, \
                    a.created_at, a.updated_at \
             FROM accounts a WHERE a.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Make sure at least `count` accounts exist, creating zero-balance
    /// accounts for the shortfall. Returns how many were created.
    pub async fn seed(pool: &PgPool, count: i64) -> Result<i64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Serialise concurrent seeders so the shortfall is computed once.
        sqlx::query("LOCK TABLE accounts IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&mut *tx)
            .await?;

        let missing = (count - existing).max(0);
        for _ in 0..missing {
            sqlx::query("INSERT INTO accounts DEFAULT VALUES")
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(missing)
    }

    /// Read the balance inside an open transaction.
    pub async fn balance(conn: &mut PgConnection, id: DbId) -> Result<Option<Amount>, sqlx::Error> {
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Add `delta` to the balance inside an open transaction.
    ///
    /// Returns the new balance, or `None` if the account does not exist. A
    /// result below zero fails with a check violation on
    /// [`BALANCE_CONSTRAINT`].
    pub async fn add_to_balance(
        conn: &mut PgConnection,
        id: DbId,
        delta: Amount,
    ) -> Result<Option<Amount>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE accounts SET balance = balance + $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING balance",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(conn)
        .await
    }
}
