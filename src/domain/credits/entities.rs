//! Credits domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::value_objects::UserId;

use super::value_objects::{TransactionId, TransactionReason};

/// Per-user points balance
///
/// Mutated only together with an appended [`CreditsTransaction`] in one
/// atomic storage unit. The balance never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsAccount {
    pub user_id: UserId,
    pub balance: i64,
}

impl CreditsAccount {
    pub fn new(user_id: UserId, initial_balance: i64) -> Self {
        Self {
            user_id,
            balance: initial_balance,
        }
    }

    pub fn can_apply(&self, amount: i64) -> bool {
        self.balance + amount >= 0
    }
}

/// One immutable ledger entry
///
/// Signed `amount`: positive for additions, negative for deductions. The row
/// invariant `balance_before + amount == balance_after` must hold for every
/// entry ever written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reason: TransactionReason,
    /// Generation this entry paid for, when applicable
    pub generation_id: Option<String>,
    /// For refunds, the transaction being refunded
    pub reference_id: Option<TransactionId>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CreditsTransaction {
    /// Build the entry for applying `amount` on top of `balance_before`
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        user_id: UserId,
        amount: i64,
        balance_before: i64,
        reason: TransactionReason,
        generation_id: Option<String>,
        reference_id: Option<TransactionId>,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            reason,
            generation_id,
            reference_id,
            metadata,
            created_at,
        }
    }

    /// Check the row invariant of this entry
    pub fn balances_consistent(&self) -> bool {
        self.balance_before + self.amount == self.balance_after
    }

    pub fn is_addition(&self) -> bool {
        self.amount > 0
    }
}

/// Lifetime earn/spend totals for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTotals {
    /// Sum of positive amounts
    pub earned: i64,
    /// Sum of deduction magnitudes (reported positive)
    pub spent: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_computes_balance_after() {
        let user = UserId::generate();
        let tx = CreditsTransaction::record(
            user,
            -30,
            100,
            TransactionReason::Generation,
            Some("gen_1".to_string()),
            None,
            serde_json::Value::Null,
            Utc::now(),
        );
        assert_eq!(tx.balance_after, 70);
        assert!(tx.balances_consistent());
        assert!(!tx.is_addition());
    }

    #[test]
    fn test_inconsistent_row_detected() {
        let user = UserId::generate();
        let mut tx = CreditsTransaction::record(
            user,
            50,
            0,
            TransactionReason::Purchase,
            None,
            None,
            serde_json::Value::Null,
            Utc::now(),
        );
        tx.balance_after = 999;
        assert!(!tx.balances_consistent());
    }

    #[test]
    fn test_account_can_apply() {
        let account = CreditsAccount::new(UserId::generate(), 10);
        assert!(account.can_apply(-10));
        assert!(!account.can_apply(-11));
        assert!(account.can_apply(5));
    }
}
