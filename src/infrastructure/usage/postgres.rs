//! SQLx implementation of the usage storage backend

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::identity::{
    FingerprintProfile, IdentityKind, IpBlock, KindUsage, TrackingError, UsageKey, UsageRecord,
    UsageStats, UsageStore, UserId,
};

/// Database row for the usage_tracking table
#[derive(Debug, sqlx::FromRow)]
struct UsageRecordRow {
    identity_kind: String,
    identity_value: String,
    day: NaiveDate,
    generation_count: i32,
    last_used_at: DateTime<Utc>,
    suspicious: bool,
}

/// Database row for the fingerprint_tracking table
#[derive(Debug, sqlx::FromRow)]
struct FingerprintRow {
    fingerprint_hash: String,
    user_ids: Vec<Uuid>,
    ip_hashes: Vec<String>,
    is_blocked: bool,
    last_seen_at: DateTime<Utc>,
}

/// Database row for the ip_blocks table
#[derive(Debug, sqlx::FromRow)]
struct IpBlockRow {
    ip_hash: String,
    blocked_until: DateTime<Utc>,
}

/// Per-kind aggregation row for usage stats
#[derive(Debug, sqlx::FromRow)]
struct KindStatsRow {
    identity_kind: String,
    generations: i64,
    distinct_identities: i64,
    suspicious_records: i64,
}

/// Postgres implementation of the usage storage backend
///
/// Counter updates go through `INSERT .. ON CONFLICT .. DO UPDATE`, so
/// concurrent recordings under one key serialize inside the database and
/// none are lost.
pub struct SqlxUsageStore {
    pool: Arc<PgPool>,
}

impl SqlxUsageStore {
    /// Create a new SQLx usage store
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn parse_kind(raw: &str) -> Result<IdentityKind, TrackingError> {
        IdentityKind::parse(raw)
            .ok_or_else(|| TrackingError::database(format!("Unknown identity kind in row: {raw}")))
    }

    fn row_to_record(row: UsageRecordRow) -> Result<UsageRecord, TrackingError> {
        Ok(UsageRecord {
            kind: Self::parse_kind(&row.identity_kind)?,
            identity_value: row.identity_value,
            day: row.day,
            generation_count: row.generation_count.max(0) as u32,
            last_used_at: row.last_used_at,
            suspicious: row.suspicious,
        })
    }

    fn row_to_profile(row: FingerprintRow) -> FingerprintProfile {
        FingerprintProfile {
            fingerprint_hash: row.fingerprint_hash,
            user_ids: row.user_ids.into_iter().map(UserId::from).collect(),
            ip_hashes: row.ip_hashes,
            is_blocked: row.is_blocked,
            last_seen_at: row.last_seen_at,
        }
    }

    fn db_error(context: &str, e: sqlx::Error) -> TrackingError {
        tracing::error!("Database error {}: {}", context, e);
        TrackingError::database(e.to_string())
    }
}

#[async_trait]
impl UsageStore for SqlxUsageStore {
    #[instrument(skip(self, key, now), fields(kind = %key.kind, day = %key.day))]
    async fn increment_usage(
        &self,
        key: &UsageKey,
        now: DateTime<Utc>,
    ) -> Result<u32, TrackingError> {
        let count: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO usage_tracking (
                identity_kind, identity_value, day, generation_count, last_used_at, suspicious
            )
            VALUES ($1, $2, $3, 1, $4, FALSE)
            ON CONFLICT (identity_kind, identity_value, day) DO UPDATE SET
                generation_count = usage_tracking.generation_count + 1,
                last_used_at = EXCLUDED.last_used_at
            RETURNING generation_count
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.identity_value)
        .bind(key.day)
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Self::db_error("incrementing usage counter", e))?;

        Ok(count.max(0) as u32)
    }

    async fn usage_count(&self, key: &UsageKey) -> Result<Option<u32>, TrackingError> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT generation_count
            FROM usage_tracking
            WHERE identity_kind = $1 AND identity_value = $2 AND day = $3
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.identity_value)
        .bind(key.day)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Self::db_error("reading usage counter", e))?;

        Ok(count.map(|c| c.max(0) as u32))
    }

    async fn usage_record(&self, key: &UsageKey) -> Result<Option<UsageRecord>, TrackingError> {
        let row = sqlx::query_as::<_, UsageRecordRow>(
            r#"
            SELECT identity_kind, identity_value, day, generation_count, last_used_at, suspicious
            FROM usage_tracking
            WHERE identity_kind = $1 AND identity_value = $2 AND day = $3
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.identity_value)
        .bind(key.day)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Self::db_error("reading usage record", e))?;

        row.map(Self::row_to_record).transpose()
    }

    async fn mark_suspicious(&self, key: &UsageKey) -> Result<(), TrackingError> {
        sqlx::query(
            r#"
            UPDATE usage_tracking
            SET suspicious = TRUE
            WHERE identity_kind = $1 AND identity_value = $2 AND day = $3
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.identity_value)
        .bind(key.day)
        .execute(&*self.pool)
        .await
        .map_err(|e| Self::db_error("marking usage record suspicious", e))?;

        Ok(())
    }

    #[instrument(skip_all, fields(fingerprint = %crate::domain::identity::truncate_for_log(fingerprint_hash)))]
    async fn upsert_fingerprint_profile(
        &self,
        fingerprint_hash: &str,
        ip_hash: &str,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<FingerprintProfile, TrackingError> {
        let user_ids: Vec<Uuid> = user_id.map(|u| vec![u.as_uuid()]).unwrap_or_default();
        let ip_hashes = vec![ip_hash.to_string()];

        let row = sqlx::query_as::<_, FingerprintRow>(
            r#"
            INSERT INTO fingerprint_tracking (
                fingerprint_hash, user_ids, ip_hashes, is_blocked, last_seen_at
            )
            VALUES ($1, $2, $3, FALSE, $4)
            ON CONFLICT (fingerprint_hash) DO UPDATE SET
                user_ids = ARRAY(
                    SELECT DISTINCT u
                    FROM unnest(fingerprint_tracking.user_ids || EXCLUDED.user_ids) AS u
                ),
                ip_hashes = ARRAY(
                    SELECT DISTINCT h
                    FROM unnest(fingerprint_tracking.ip_hashes || EXCLUDED.ip_hashes) AS h
                ),
                last_seen_at = EXCLUDED.last_seen_at
            RETURNING fingerprint_hash, user_ids, ip_hashes, is_blocked, last_seen_at
            "#,
        )
        .bind(fingerprint_hash)
        .bind(&user_ids)
        .bind(&ip_hashes)
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Self::db_error("upserting fingerprint profile", e))?;

        Ok(Self::row_to_profile(row))
    }

    async fn fingerprint_profile(
        &self,
        fingerprint_hash: &str,
    ) -> Result<Option<FingerprintProfile>, TrackingError> {
        let row = sqlx::query_as::<_, FingerprintRow>(
            r#"
            SELECT fingerprint_hash, user_ids, ip_hashes, is_blocked, last_seen_at
            FROM fingerprint_tracking
            WHERE fingerprint_hash = $1
            "#,
        )
        .bind(fingerprint_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Self::db_error("reading fingerprint profile", e))?;

        Ok(row.map(Self::row_to_profile))
    }

    async fn active_ip_block(
        &self,
        ip_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IpBlock>, TrackingError> {
        let row = sqlx::query_as::<_, IpBlockRow>(
            r#"
            SELECT ip_hash, blocked_until
            FROM ip_blocks
            WHERE ip_hash = $1 AND blocked_until > $2
            "#,
        )
        .bind(ip_hash)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Self::db_error("reading ip block", e))?;

        Ok(row.map(|r| IpBlock {
            ip_hash: r.ip_hash,
            blocked_until: r.blocked_until,
        }))
    }

    #[instrument(skip(self))]
    async fn stats(&self, from: NaiveDate, to: NaiveDate) -> Result<UsageStats, TrackingError> {
        let rows = sqlx::query_as::<_, KindStatsRow>(
            r#"
            SELECT identity_kind,
                   COALESCE(SUM(generation_count), 0)::BIGINT AS generations,
                   COUNT(DISTINCT identity_value) AS distinct_identities,
                   COUNT(*) FILTER (WHERE suspicious) AS suspicious_records
            FROM usage_tracking
            WHERE day BETWEEN $1 AND $2
            GROUP BY identity_kind
            ORDER BY identity_kind
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Self::db_error("aggregating usage stats", e))?;

        let mut by_kind = Vec::with_capacity(rows.len());
        for row in rows {
            by_kind.push(KindUsage {
                kind: Self::parse_kind(&row.identity_kind)?,
                generations: row.generations.max(0) as u64,
                distinct_identities: row.distinct_identities.max(0) as u64,
                suspicious_records: row.suspicious_records.max(0) as u64,
            });
        }

        Ok(UsageStats::from_kind_rows(from, to, by_kind))
    }

    async fn purge_usage_before(&self, day: NaiveDate) -> Result<u64, TrackingError> {
        let result = sqlx::query("DELETE FROM usage_tracking WHERE day < $1")
            .bind(day)
            .execute(&*self.pool)
            .await
            .map_err(|e| Self::db_error("purging usage records", e))?;

        Ok(result.rows_affected())
    }

    async fn purge_ip_blocks_before(&self, now: DateTime<Utc>) -> Result<u64, TrackingError> {
        let result = sqlx::query("DELETE FROM ip_blocks WHERE blocked_until <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| Self::db_error("purging expired ip blocks", e))?;

        Ok(result.rows_affected())
    }
}
