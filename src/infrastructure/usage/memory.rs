//! In-memory usage storage backend

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::domain::identity::{
    FingerprintProfile, IdentityKind, IpBlock, KindUsage, TrackingError, UsageKey, UsageRecord,
    UsageStats, UsageStore, UserId,
};

/// In-memory usage storage (suitable for tests and single-instance setups)
///
/// Counter updates happen under one write lock, which gives the same
/// insert-or-increment atomicity the durable backend gets from its upsert.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    usage: Arc<RwLock<HashMap<UsageKey, UsageRecord>>>,
    profiles: Arc<RwLock<HashMap<String, FingerprintProfile>>>,
    blocks: Arc<RwLock<HashMap<String, IpBlock>>>,
}

impl InMemoryUsageStore {
    /// Create a new in-memory storage backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an ip block entry
    ///
    /// The block list is written by the abuse workflow, which sits outside
    /// this crate; single-instance deployments (and tests) feed it through
    /// this method.
    pub async fn insert_ip_block(&self, block: IpBlock) {
        let mut blocks = self.blocks.write().await;
        blocks.insert(block.ip_hash.clone(), block);
    }

    /// Set the blocked flag on a fingerprint profile, creating it if needed
    pub async fn set_fingerprint_blocked(&self, fingerprint_hash: &str, blocked: bool) {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(fingerprint_hash.to_string())
            .or_insert_with(|| FingerprintProfile::new(fingerprint_hash, Utc::now()));
        profile.is_blocked = blocked;
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn increment_usage(
        &self,
        key: &UsageKey,
        now: DateTime<Utc>,
    ) -> Result<u32, TrackingError> {
        let mut usage = self.usage.write().await;
        let record = usage
            .entry(key.clone())
            .and_modify(|r| r.record_generation(now))
            .or_insert_with(|| UsageRecord::first(key, now));
        Ok(record.generation_count)
    }

    async fn usage_count(&self, key: &UsageKey) -> Result<Option<u32>, TrackingError> {
        let usage = self.usage.read().await;
        Ok(usage.get(key).map(|r| r.generation_count))
    }

    async fn usage_record(&self, key: &UsageKey) -> Result<Option<UsageRecord>, TrackingError> {
        let usage = self.usage.read().await;
        Ok(usage.get(key).cloned())
    }

    async fn mark_suspicious(&self, key: &UsageKey) -> Result<(), TrackingError> {
        let mut usage = self.usage.write().await;
        if let Some(record) = usage.get_mut(key) {
            record.suspicious = true;
        }
        Ok(())
    }

    async fn upsert_fingerprint_profile(
        &self,
        fingerprint_hash: &str,
        ip_hash: &str,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<FingerprintProfile, TrackingError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(fingerprint_hash.to_string())
            .or_insert_with(|| FingerprintProfile::new(fingerprint_hash, now));
        profile.merge_observation(ip_hash, user_id, now);
        Ok(profile.clone())
    }

    async fn fingerprint_profile(
        &self,
        fingerprint_hash: &str,
    ) -> Result<Option<FingerprintProfile>, TrackingError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(fingerprint_hash).cloned())
    }

    async fn active_ip_block(
        &self,
        ip_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IpBlock>, TrackingError> {
        let blocks = self.blocks.read().await;
        Ok(blocks.get(ip_hash).filter(|b| b.is_active(now)).cloned())
    }

    async fn stats(&self, from: NaiveDate, to: NaiveDate) -> Result<UsageStats, TrackingError> {
        let usage = self.usage.read().await;

        let mut generations: HashMap<IdentityKind, u64> = HashMap::new();
        let mut identities: HashMap<IdentityKind, HashSet<&str>> = HashMap::new();
        let mut suspicious: HashMap<IdentityKind, u64> = HashMap::new();

        for record in usage.values() {
            if record.day < from || record.day > to {
                continue;
            }
            *generations.entry(record.kind).or_default() += u64::from(record.generation_count);
            identities
                .entry(record.kind)
                .or_default()
                .insert(record.identity_value.as_str());
            if record.suspicious {
                *suspicious.entry(record.kind).or_default() += 1;
            }
        }

        let mut by_kind: Vec<KindUsage> = generations
            .iter()
            .map(|(kind, total)| KindUsage {
                kind: *kind,
                generations: *total,
                distinct_identities: identities.get(kind).map(|s| s.len() as u64).unwrap_or(0),
                suspicious_records: suspicious.get(kind).copied().unwrap_or(0),
            })
            .collect();
        by_kind.sort_by_key(|k| k.kind.as_str());

        Ok(UsageStats::from_kind_rows(from, to, by_kind))
    }

    async fn purge_usage_before(&self, day: NaiveDate) -> Result<u64, TrackingError> {
        let mut usage = self.usage.write().await;
        let before = usage.len();
        usage.retain(|key, _| key.day >= day);
        Ok((before - usage.len()) as u64)
    }

    async fn purge_ip_blocks_before(&self, now: DateTime<Utc>) -> Result<u64, TrackingError> {
        let mut blocks = self.blocks.write().await;
        let before = blocks.len();
        blocks.retain(|_, block| block.blocked_until > now);
        Ok((before - blocks.len()) as u64)
    }
}
