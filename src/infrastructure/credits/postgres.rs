//! SQLx implementation of the credits ledger backend

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::credits::{
    CreditsStore, CreditsTransaction, HistoryTotals, LedgerError, TransactionId, TransactionReason,
};
use crate::domain::identity::UserId;

/// Database row for the credits_transactions table
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    reason: String,
    generation_id: Option<String>,
    reference_id: Option<Uuid>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

/// Aggregation row for lifetime totals
#[derive(Debug, sqlx::FromRow)]
struct TotalsRow {
    earned: i64,
    spent: i64,
}

const TRANSACTION_COLUMNS: &str = "id, user_id, amount, balance_before, balance_after, \
     reason, generation_id, reference_id, metadata, created_at";

/// Postgres implementation of the credits ledger
///
/// `apply` runs inside one database transaction: the account row is taken
/// `FOR UPDATE`, which serializes concurrent mutations of the same user, and
/// balance update plus transaction insert commit together or not at all.
pub struct SqlxCreditsStore {
    pool: Arc<PgPool>,
    initial_balance: i64,
}

impl SqlxCreditsStore {
    /// Create a new SQLx credits store where unknown users start at
    /// `initial_balance`
    pub fn new(pool: Arc<PgPool>, initial_balance: i64) -> Self {
        Self {
            pool,
            initial_balance,
        }
    }

    fn row_to_transaction(row: TransactionRow) -> Result<CreditsTransaction, LedgerError> {
        let reason = TransactionReason::from_str(&row.reason)
            .map_err(|e| LedgerError::database(format!("Corrupt transaction row: {e}")))?;
        Ok(CreditsTransaction {
            id: TransactionId::from(row.id),
            user_id: UserId::from(row.user_id),
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reason,
            generation_id: row.generation_id,
            reference_id: row.reference_id.map(TransactionId::from),
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }

    fn db_error(context: &str, e: sqlx::Error) -> LedgerError {
        tracing::error!("Database error {}: {}", context, e);
        LedgerError::database(e.to_string())
    }
}

#[async_trait]
impl CreditsStore for SqlxCreditsStore {
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM credits_accounts WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| Self::db_error("reading balance", e))?;

        Ok(balance.unwrap_or(self.initial_balance))
    }

    #[instrument(skip_all, fields(user_id = %user_id, amount = amount, reason = %reason))]
    async fn apply(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: TransactionReason,
        generation_id: Option<String>,
        reference_id: Option<TransactionId>,
        metadata: serde_json::Value,
    ) -> Result<CreditsTransaction, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::db_error("opening ledger transaction", e))?;

        // Materialize the account on first mutation; the ON CONFLICT arm
        // makes two concurrent first mutations serialize on the same row
        sqlx::query(
            r#"
            INSERT INTO credits_accounts (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(self.initial_balance)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::db_error("materializing account", e))?;

        let balance_before: i64 =
            sqlx::query_scalar("SELECT balance FROM credits_accounts WHERE user_id = $1 FOR UPDATE")
                .bind(user_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Self::db_error("locking account row", e))?;

        if balance_before + amount < 0 {
            tx.rollback()
                .await
                .map_err(|e| Self::db_error("rolling back rejected apply", e))?;
            return Err(LedgerError::InsufficientPoints {
                balance: balance_before,
            });
        }

        let entry = CreditsTransaction::record(
            *user_id,
            amount,
            balance_before,
            reason,
            generation_id,
            reference_id,
            metadata,
            Utc::now(),
        );

        sqlx::query("UPDATE credits_accounts SET balance = $2 WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .bind(entry.balance_after)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_error("updating balance", e))?;

        sqlx::query(
            r#"
            INSERT INTO credits_transactions (
                id, user_id, amount, balance_before, balance_after,
                reason, generation_id, reference_id, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.reason.as_str())
        .bind(&entry.generation_id)
        .bind(entry.reference_id.map(|r| r.as_uuid()))
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::db_error("appending transaction", e))?;

        tx.commit()
            .await
            .map_err(|e| Self::db_error("committing ledger transaction", e))?;

        Ok(entry)
    }

    async fn transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditsTransaction>, LedgerError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credits_transactions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Self::db_error("reading transaction", e))?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn history_page(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CreditsTransaction>, LedgerError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM credits_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Self::db_error("reading transaction history", e))?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn history_totals(&self, user_id: &UserId) -> Result<HistoryTotals, LedgerError> {
        let row = sqlx::query_as::<_, TotalsRow>(
            r#"
            SELECT COALESCE(SUM(amount) FILTER (WHERE amount > 0), 0)::BIGINT AS earned,
                   COALESCE(SUM(-amount) FILTER (WHERE amount < 0), 0)::BIGINT AS spent
            FROM credits_transactions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Self::db_error("aggregating history totals", e))?;

        Ok(HistoryTotals {
            earned: row.earned,
            spent: row.spent,
        })
    }

    async fn recent_transactions(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<CreditsTransaction>, LedgerError> {
        self.history_page(user_id, limit, 0).await
    }
}
