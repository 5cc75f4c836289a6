//! Usage-side storage trait

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::entities::{FingerprintProfile, IpBlock, UsageRecord, UsageStats};
use super::errors::TrackingError;
use super::value_objects::{UsageKey, UserId};

/// Storage strategy for usage counters, fingerprint profiles and block lookups
///
/// Implementations must make `increment_usage` atomic (insert-or-increment in
/// one step, never read-then-write) so concurrent recordings under the same
/// key cannot lose updates. The backend is chosen at composition time and
/// injected; nothing in this crate assumes a particular implementation.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Atomically create-or-increment the counter under `key`, returning the
    /// new count
    async fn increment_usage(
        &self,
        key: &UsageKey,
        now: DateTime<Utc>,
    ) -> Result<u32, TrackingError>;

    /// Current count under `key`, `None` if no generation was recorded yet
    async fn usage_count(&self, key: &UsageKey) -> Result<Option<u32>, TrackingError>;

    /// Full usage record under `key`
    async fn usage_record(&self, key: &UsageKey) -> Result<Option<UsageRecord>, TrackingError>;

    /// Flag the record under `key` as suspicious (no-op if absent)
    async fn mark_suspicious(&self, key: &UsageKey) -> Result<(), TrackingError>;

    /// Merge one observation into the fingerprint profile, creating it if
    /// needed, and return the post-merge profile
    async fn upsert_fingerprint_profile(
        &self,
        fingerprint_hash: &str,
        ip_hash: &str,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<FingerprintProfile, TrackingError>;

    /// Look up a fingerprint profile
    async fn fingerprint_profile(
        &self,
        fingerprint_hash: &str,
    ) -> Result<Option<FingerprintProfile>, TrackingError>;

    /// Active block entry for an ip hash, `None` when absent or expired
    async fn active_ip_block(
        &self,
        ip_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IpBlock>, TrackingError>;

    /// Aggregate usage over an inclusive date range
    async fn stats(&self, from: NaiveDate, to: NaiveDate) -> Result<UsageStats, TrackingError>;

    /// Delete usage records with a day strictly before `day`, returning the
    /// number removed
    async fn purge_usage_before(&self, day: NaiveDate) -> Result<u64, TrackingError>;

    /// Delete ip blocks whose `blocked_until` is at or before `now`
    async fn purge_ip_blocks_before(&self, now: DateTime<Utc>) -> Result<u64, TrackingError>;
}
