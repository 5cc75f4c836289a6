//! Credits ledger storage trait

use async_trait::async_trait;

use crate::domain::identity::value_objects::UserId;

use super::entities::{CreditsTransaction, HistoryTotals};
use super::errors::LedgerError;
use super::value_objects::{TransactionId, TransactionReason};

/// Storage strategy for the points ledger
///
/// `apply` is the single mutation path: balance update plus appended
/// transaction row as one all-or-nothing unit, serialized per user. A durable
/// backend uses database transactions and row locks; the in-memory backend
/// uses an optimistic version check with bounded retries. Either way a failed
/// apply leaves no partial state behind.
#[async_trait]
pub trait CreditsStore: Send + Sync {
    /// Current balance; a user without an account reads as the configured
    /// initial balance
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError>;

    /// Apply a signed amount to the balance and append the matching
    /// transaction row atomically
    ///
    /// Rejects with [`LedgerError::InsufficientPoints`] when the amount would
    /// drive the balance negative; nothing is written in that case.
    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: TransactionReason,
        generation_id: Option<String>,
        reference_id: Option<TransactionId>,
        metadata: serde_json::Value,
    ) -> Result<CreditsTransaction, LedgerError>;

    /// Look up one transaction by id
    async fn transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditsTransaction>, LedgerError>;

    /// Page of a user's transactions, newest first
    async fn history_page(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CreditsTransaction>, LedgerError>;

    /// Lifetime earned/spent totals for a user
    async fn history_totals(&self, user_id: &UserId) -> Result<HistoryTotals, LedgerError>;

    /// Most recent transactions for a user, newest first, for audit scans
    async fn recent_transactions(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<CreditsTransaction>, LedgerError>;
}
