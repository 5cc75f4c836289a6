//! Credits ledger service - transactional points accounting
//!
//! Thin orchestration over the injected [`CreditsStore`]: amount validation,
//! the receipt shape handed to the web layer, and the fail-secure policy on
//! storage errors. Insufficient points is an expected outcome and comes back
//! as a denial inside the receipt; only caller bugs (zero amounts) propagate
//! as errors.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::domain::credits::{
    CreditsStore, CreditsTransaction, LedgerError, TransactionId, TransactionReason,
};
use crate::domain::identity::UserId;

/// Why a ledger operation was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerDenial {
    /// Balance is lower than the requested deduction
    InsufficientPoints,
    /// Storage failed; nothing was granted or written
    Unavailable,
}

/// Flat outcome of a ledger mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReceipt {
    pub success: bool,
    /// Balance after the operation; on denial the balance at decision time,
    /// or 0 when storage could not be consulted
    pub balance: i64,
    pub transaction_id: Option<TransactionId>,
    pub denial: Option<LedgerDenial>,
}

impl LedgerReceipt {
    /// Receipt for a committed transaction
    pub fn granted(entry: &CreditsTransaction) -> Self {
        Self {
            success: true,
            balance: entry.balance_after,
            transaction_id: Some(entry.id),
            denial: None,
        }
    }

    /// Denied: balance too low, nothing written
    pub fn insufficient(balance: i64) -> Self {
        Self {
            success: false,
            balance,
            transaction_id: None,
            denial: Some(LedgerDenial::InsufficientPoints),
        }
    }

    /// Denied: storage failure, nothing written
    pub fn unavailable() -> Self {
        Self {
            success: false,
            balance: 0,
            transaction_id: None,
            denial: Some(LedgerDenial::Unavailable),
        }
    }
}

/// A user's transaction page together with lifetime aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditsHistory {
    pub transactions: Vec<CreditsTransaction>,
    pub total_earned: i64,
    pub total_spent: i64,
    pub current_balance: i64,
}

/// Service maintaining the per-user points ledger
pub struct CreditsLedgerService {
    store: Arc<dyn CreditsStore>,
}

impl CreditsLedgerService {
    /// Create a new credits ledger service
    pub fn new(store: Arc<dyn CreditsStore>) -> Self {
        Self { store }
    }

    fn validate_amount(amount: u32) -> Result<i64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::invalid_amount("amount must be positive"));
        }
        Ok(i64::from(amount))
    }

    /// Current balance; unknown users read as the configured initial balance
    pub async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        self.store.balance(&user_id).await
    }

    /// Deduct points, typically to pay for one generation
    ///
    /// Returns `Err` only for invalid amounts; business denials and storage
    /// failures come back inside the receipt.
    #[instrument(skip(self, metadata), fields(user_id = %user_id, amount, reason = %reason))]
    pub async fn deduct_points(
        &self,
        user_id: UserId,
        amount: u32,
        reason: TransactionReason,
        generation_id: Option<String>,
        reference_id: Option<TransactionId>,
        metadata: serde_json::Value,
    ) -> Result<LedgerReceipt, LedgerError> {
        let amount = Self::validate_amount(amount)?;

        match self
            .store
            .apply(&user_id, -amount, reason, generation_id, reference_id, metadata)
            .await
        {
            Ok(entry) => Ok(LedgerReceipt::granted(&entry)),
            Err(LedgerError::InsufficientPoints { balance }) => {
                debug!(balance, "Deduction denied, insufficient points");
                Ok(LedgerReceipt::insufficient(balance))
            }
            Err(e) => {
                warn!(error = %e, "Deduction failed, denying (fail secure)");
                Ok(LedgerReceipt::unavailable())
            }
        }
    }

    /// Add points (purchases, grants, promotions)
    #[instrument(skip(self, metadata), fields(user_id = %user_id, amount, reason = %reason))]
    pub async fn add_points(
        &self,
        user_id: UserId,
        amount: u32,
        reason: TransactionReason,
        reference_id: Option<TransactionId>,
        metadata: serde_json::Value,
    ) -> Result<LedgerReceipt, LedgerError> {
        let amount = Self::validate_amount(amount)?;

        match self
            .store
            .apply(&user_id, amount, reason, None, reference_id, metadata)
            .await
        {
            Ok(entry) => Ok(LedgerReceipt::granted(&entry)),
            Err(e) => {
                // No silent credit: a failed addition stays failed
                warn!(error = %e, "Addition failed, denying (fail secure)");
                Ok(LedgerReceipt::unavailable())
            }
        }
    }

    /// Return points after a failed generation, referencing the original
    /// deduction
    pub async fn refund_points(
        &self,
        user_id: UserId,
        amount: u32,
        original_transaction_id: TransactionId,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.add_points(
            user_id,
            amount,
            TransactionReason::Refund,
            Some(original_transaction_id),
            serde_json::Value::Null,
        )
        .await
    }

    /// Page through a user's transactions together with lifetime totals
    pub async fn history(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<CreditsHistory, LedgerError> {
        let (page, totals, balance) = tokio::join!(
            self.store.history_page(&user_id, limit, offset),
            self.store.history_totals(&user_id),
            self.store.balance(&user_id),
        );
        let totals = totals?;

        Ok(CreditsHistory {
            transactions: page?,
            total_earned: totals.earned,
            total_spent: totals.spent,
            current_balance: balance?,
        })
    }

    /// Recompute the row invariant of one transaction
    ///
    /// Unknown ids are an error; a present but inconsistent row is
    /// `Ok(false)`.
    pub async fn verify_transaction(&self, id: TransactionId) -> Result<bool, LedgerError> {
        match self.store.transaction(&id).await? {
            Some(entry) => {
                let consistent = entry.balances_consistent();
                if !consistent {
                    warn!(transaction_id = %id, "Ledger row invariant violated");
                }
                Ok(consistent)
            }
            None => Err(LedgerError::TransactionNotFound { id: id.to_string() }),
        }
    }
}
