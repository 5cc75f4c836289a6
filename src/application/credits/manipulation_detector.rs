//! Read-only audit pass over a user's recent ledger activity
//!
//! Scans the most recent transactions for integrity violations and abuse
//! patterns. Detection only: nothing is corrected or blocked here, findings
//! go to the abuse workflow.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::config::DetectionConfig;
use crate::domain::credits::{CreditsStore, LedgerError, TransactionId};
use crate::domain::identity::UserId;

/// One indicator found by the audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManipulationReason {
    /// `balance_before + amount != balance_after` on a stored row
    InvariantViolation { transaction_id: TransactionId },
    /// More additions in the trailing hour than the configured threshold
    ExcessiveAdditions { count: u32, threshold: u32 },
    /// More points added in the trailing hour than the configured threshold
    ExcessivePointsAdded { points: i64, threshold: i64 },
    /// A stored row left the balance negative, which this crate never writes
    NegativeBalance {
        transaction_id: TransactionId,
        balance_after: i64,
    },
}

/// Audit result for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManipulationReport {
    pub suspicious: bool,
    pub reasons: Vec<ManipulationReason>,
}

/// Stateless ledger auditor, safe to run on a schedule
pub struct ManipulationDetector {
    store: Arc<dyn CreditsStore>,
    config: DetectionConfig,
}

impl ManipulationDetector {
    /// Create a new manipulation detector
    pub fn new(store: Arc<dyn CreditsStore>, config: DetectionConfig) -> Self {
        Self { store, config }
    }

    /// Scan the most recent transactions of one user
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn detect(&self, user_id: UserId) -> Result<ManipulationReport, LedgerError> {
        let now = Utc::now();
        let window = self
            .store
            .recent_transactions(&user_id, self.config.scan_window)
            .await?;

        let mut reasons = Vec::new();

        for entry in &window {
            if !entry.balances_consistent() {
                reasons.push(ManipulationReason::InvariantViolation {
                    transaction_id: entry.id,
                });
            }
            if entry.balance_after < 0 {
                reasons.push(ManipulationReason::NegativeBalance {
                    transaction_id: entry.id,
                    balance_after: entry.balance_after,
                });
            }
        }

        let hour_ago = now - TimeDelta::hours(1);
        let recent_additions: Vec<_> = window
            .iter()
            .filter(|t| t.is_addition() && t.created_at > hour_ago)
            .collect();

        let addition_count = recent_additions.len() as u32;
        if addition_count > self.config.max_additions_per_hour {
            reasons.push(ManipulationReason::ExcessiveAdditions {
                count: addition_count,
                threshold: self.config.max_additions_per_hour,
            });
        }

        let points_added: i64 = recent_additions.iter().map(|t| t.amount).sum();
        if points_added > self.config.max_points_per_hour {
            reasons.push(ManipulationReason::ExcessivePointsAdded {
                points: points_added,
                threshold: self.config.max_points_per_hour,
            });
        }

        let suspicious = !reasons.is_empty();
        if suspicious {
            warn!(
                reason_count = reasons.len(),
                "Ledger manipulation indicators found"
            );
        }

        Ok(ManipulationReport {
            suspicious,
            reasons,
        })
    }
}
