//! PostgreSQL persistence for the tally ledger.
//!
//! Provides pool setup, embedded migrations, repositories for the
//! `accounts` and `queued_adjustments` tables, and [`PgLedgerStore`], the
//! production [`tally_core::ledger::LedgerStore`].

use sqlx::postgres::PgPoolOptions;

pub mod ledger;
pub mod models;
pub mod repositories;

pub use ledger::PgLedgerStore;

pub type DbPool = sqlx::PgPool;

/// Default upper bound on open connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Create a connection pool from a database URL.
///
/// The pool is bounded: under load, queue drains wait for a free
/// connection instead of opening new ones.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
