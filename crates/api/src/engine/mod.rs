//! Settlement engine.
//!
//! Coordinates every balance change for an account through three pieces:
//!
//! - [`dispatch`]: the sharded table that allows at most one queue drain per
//!   account and lets concurrent callers wait for it,
//! - [`processor`]: runs a single drain against the ledger store,
//! - [`settlement`]: the append-then-wait sequence used by HTTP handlers and
//!   the background scanner.

pub mod dispatch;
pub mod processor;
pub mod settlement;

#[cfg(test)]
pub(crate) mod test_support;
