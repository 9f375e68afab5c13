use crate::ledger::LedgerError;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Applying the account's queue would take the balance below zero.
    #[error("Insufficient funds on account {0}")]
    InsufficientFunds(DbId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for CoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds(id) => CoreError::InsufficientFunds(id),
            LedgerError::AccountNotFound(id) => CoreError::NotFound {
                entity: "Account",
                id,
            },
            LedgerError::Storage(msg) => CoreError::Internal(msg),
            LedgerError::Closed => CoreError::Internal("ledger store is closed".to_string()),
        }
    }
}
