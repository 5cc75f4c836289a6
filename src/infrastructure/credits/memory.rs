//! In-memory credits ledger backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::credits::{
    CreditsStore, CreditsTransaction, HistoryTotals, LedgerError, TransactionId, TransactionReason,
};
use crate::domain::identity::UserId;

const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy)]
struct AccountSlot {
    balance: i64,
    /// Bumped on every committed apply; the optimistic check compares it
    version: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<UserId, AccountSlot>,
    transactions: HashMap<TransactionId, CreditsTransaction>,
    /// Per-user transaction ids in commit order, newest last
    history: HashMap<UserId, Vec<TransactionId>>,
}

/// In-memory credits ledger (suitable for tests and single-instance setups)
///
/// `apply` runs an optimistic loop: snapshot balance and version under a read
/// lock, validate, then commit under the write lock only if the version is
/// still the one observed. A concurrent commit in between forces a retry with
/// a fresh snapshot, up to a bounded number of attempts.
#[derive(Debug)]
pub struct InMemoryCreditsStore {
    state: Arc<RwLock<LedgerState>>,
    initial_balance: i64,
    max_retries: u32,
}

impl InMemoryCreditsStore {
    /// Create a new in-memory ledger where unknown users start at
    /// `initial_balance`
    pub fn new(initial_balance: i64) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            initial_balance,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the bounded retry count of the optimistic apply loop
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    async fn snapshot(&self, user_id: &UserId) -> (i64, u64) {
        let state = self.state.read().await;
        state
            .accounts
            .get(user_id)
            .map(|slot| (slot.balance, slot.version))
            .unwrap_or((self.initial_balance, 0))
    }
}

#[async_trait]
impl CreditsStore for InMemoryCreditsStore {
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        Ok(self.snapshot(user_id).await.0)
    }

    async fn apply(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: TransactionReason,
        generation_id: Option<String>,
        reference_id: Option<TransactionId>,
        metadata: serde_json::Value,
    ) -> Result<CreditsTransaction, LedgerError> {
        for attempt in 0..self.max_retries {
            let (balance, version) = self.snapshot(user_id).await;

            if balance + amount < 0 {
                return Err(LedgerError::InsufficientPoints { balance });
            }

            let mut state = self.state.write().await;
            let current_version = state
                .accounts
                .get(user_id)
                .map(|slot| slot.version)
                .unwrap_or(0);
            if current_version != version {
                // Someone committed between snapshot and write lock
                debug!(attempt, user_id = %user_id, "Ledger apply raced, retrying");
                continue;
            }

            let entry = CreditsTransaction::record(
                *user_id,
                amount,
                balance,
                reason,
                generation_id.clone(),
                reference_id,
                metadata.clone(),
                Utc::now(),
            );

            state.accounts.insert(
                *user_id,
                AccountSlot {
                    balance: entry.balance_after,
                    version: version + 1,
                },
            );
            state.history.entry(*user_id).or_default().push(entry.id);
            state.transactions.insert(entry.id, entry.clone());
            return Ok(entry);
        }

        Err(LedgerError::Contention {
            retries: self.max_retries,
        })
    }

    async fn transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditsTransaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.transactions.get(id).cloned())
    }

    async fn history_page(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CreditsTransaction>, LedgerError> {
        let state = self.state.read().await;
        let Some(ids) = state.history.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|id| state.transactions.get(id).cloned())
            .collect())
    }

    async fn history_totals(&self, user_id: &UserId) -> Result<HistoryTotals, LedgerError> {
        let state = self.state.read().await;
        let mut totals = HistoryTotals::default();
        if let Some(ids) = state.history.get(user_id) {
            for id in ids {
                if let Some(entry) = state.transactions.get(id) {
                    if entry.amount > 0 {
                        totals.earned += entry.amount;
                    } else {
                        totals.spent += -entry.amount;
                    }
                }
            }
        }
        Ok(totals)
    }

    async fn recent_transactions(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<CreditsTransaction>, LedgerError> {
        self.history_page(user_id, limit, 0).await
    }
}
