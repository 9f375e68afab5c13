//! Queued adjustment model.

use serde::Serialize;
use sqlx::FromRow;
use tally_core::types::{Amount, DbId, Timestamp};

/// A row from the `queued_adjustments` table. Never mutated in place.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueuedAdjustment {
    pub id: DbId,
    pub account_id: DbId,
    pub delta: Amount,
    pub created_at: Timestamp,
}
