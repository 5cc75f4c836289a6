//! Credits ledger domain errors

use thiserror::Error;

/// Credits-specific domain errors
///
/// `InsufficientPoints` carries the balance at decision time so callers can
/// report it without a second read. It is an expected outcome at the service
/// boundary, not a failure of the ledger itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient points: balance is {balance}")]
    InsufficientPoints { balance: i64 },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Transaction not found: {id}")]
    TransactionNotFound { id: String },

    #[error("Concurrent update conflict persisted after {retries} retries")]
    Contention { retries: u32 },

    #[error("Database error: {message}")]
    DatabaseError { message: String },
}

impl LedgerError {
    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::InvalidAmount {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }
}
