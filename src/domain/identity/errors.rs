//! Usage-tracking domain errors

use thiserror::Error;

/// Usage-tracking specific domain errors
///
/// Limit exhaustion is not an error; it is reported through the structured
/// limit-check result. Errors here mean the storage collaborator failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Storage backend unavailable: {message}")]
    StorageUnavailable { message: String },
}

impl TrackingError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }
}
