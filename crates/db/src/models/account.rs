//! Account entity model.

use serde::Serialize;
use sqlx::FromRow;
use tally_core::types::{Amount, DbId, Timestamp};

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: DbId,
    pub balance: Amount,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An account together with the size of its pending queue.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccountOverview {
    pub id: DbId,
    pub balance: Amount,
    pub pending_adjustments: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
