//! Configuration validation module

use crate::config::{DatabaseConfig, DetectionConfig, HasherConfig, LedgerConfig, QuotaConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Quota configuration error: {message}")]
    Quota { message: String },

    #[error("Hasher configuration error: {message}")]
    Hasher { message: String },

    #[error("Ledger configuration error: {message}")]
    Ledger { message: String },

    #[error("Detection configuration error: {message}")]
    Detection { message: String },

    #[error("Database configuration error: {message}")]
    Database { message: String },
}

impl ValidationError {
    pub fn quota(message: impl Into<String>) -> Self {
        Self::Quota {
            message: message.into(),
        }
    }

    pub fn hasher(message: impl Into<String>) -> Self {
        Self::Hasher {
            message: message.into(),
        }
    }

    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
        }
    }

    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}

impl Validate for QuotaConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.daily_free_limit == 0 {
            return Err(ValidationError::quota(
                "daily_free_limit must be greater than 0".to_string(),
            ));
        }

        if self.premium_daily_limit == 0 {
            return Err(ValidationError::quota(
                "premium_daily_limit must be greater than 0".to_string(),
            ));
        }

        if self.retention_days == 0 {
            return Err(ValidationError::quota(
                "retention_days must be greater than 0".to_string(),
            ));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(ValidationError::quota(
                "cleanup_interval_seconds must be greater than 0".to_string(),
            ));
        }

        // A threshold below 2 would flag every fingerprint that ever saw a user
        if self.suspicious_user_threshold < 2 {
            return Err(ValidationError::quota(
                "suspicious_user_threshold must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}

impl Validate for HasherConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.rotation_hours == 0 {
            return Err(ValidationError::hasher(
                "rotation_hours must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Validate for LedgerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_balance < 0 {
            return Err(ValidationError::ledger(
                "initial_balance cannot be negative".to_string(),
            ));
        }

        if self.max_apply_retries == 0 {
            return Err(ValidationError::ledger(
                "max_apply_retries must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Validate for DetectionConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_additions_per_hour == 0 {
            return Err(ValidationError::detection(
                "max_additions_per_hour must be greater than 0".to_string(),
            ));
        }

        if self.max_points_per_hour <= 0 {
            return Err(ValidationError::detection(
                "max_points_per_hour must be greater than 0".to_string(),
            ));
        }

        if self.scan_window == 0 {
            return Err(ValidationError::detection(
                "scan_window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // Validate database URL is not empty
        if self.url.is_empty() {
            return Err(ValidationError::database(
                "Database URL cannot be empty".to_string(),
            ));
        }

        // Validate URL format (basic check)
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::database(
                "Database URL must start with postgres:// or postgresql://".to_string(),
            ));
        }

        // Validate max_connections > 0
        if self.max_connections == 0 {
            return Err(ValidationError::database(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
