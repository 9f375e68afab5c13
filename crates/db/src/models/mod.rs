//! Row structs for the ledger tables.
//!
//! Each struct derives `FromRow` for queries and `Serialize` so handlers can
//! return it directly.

pub mod account;
pub mod adjustment;
