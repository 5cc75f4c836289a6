//! Credits domain value objects

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger transaction ID value object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TransactionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TransactionId> for Uuid {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a ledger transaction happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    /// Points spent on a generation
    Generation,
    /// Points bought through the payment flow
    Purchase,
    /// Points returned after a failed generation
    Refund,
    /// One-time signup grant
    SignupBonus,
    /// Manual support/admin correction
    AdminAdjustment,
    /// Promotional grant
    Promotion,
}

impl TransactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::Generation => "generation",
            TransactionReason::Purchase => "purchase",
            TransactionReason::Refund => "refund",
            TransactionReason::SignupBonus => "signup_bonus",
            TransactionReason::AdminAdjustment => "admin_adjustment",
            TransactionReason::Promotion => "promotion",
        }
    }
}

impl fmt::Display for TransactionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generation" => Ok(TransactionReason::Generation),
            "purchase" => Ok(TransactionReason::Purchase),
            "refund" => Ok(TransactionReason::Refund),
            "signup_bonus" => Ok(TransactionReason::SignupBonus),
            "admin_adjustment" => Ok(TransactionReason::AdminAdjustment),
            "promotion" => Ok(TransactionReason::Promotion),
            other => Err(format!("Unknown transaction reason: {}", other)),
        }
    }
}
