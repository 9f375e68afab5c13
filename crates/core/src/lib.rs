//! Domain types shared by every tally crate.
//!
//! Holds the error taxonomy, input validation, and the [`ledger::LedgerStore`]
//! contract that the settlement engine drives. Nothing in here knows about
//! HTTP or PostgreSQL.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod types;
pub mod validation;
