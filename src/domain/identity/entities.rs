//! Identity and usage-tracking domain entities

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{IdentityKind, UsageKey, UserId};

/// One per-identity per-day generation counter
///
/// A record is created by the first recorded generation of the day and
/// incremented atomically afterwards. Date rollover never mutates existing
/// rows; a new day simply starts a new key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub kind: IdentityKind,
    pub identity_value: String,
    pub day: NaiveDate,
    pub generation_count: u32,
    pub last_used_at: DateTime<Utc>,
    pub suspicious: bool,
}

impl UsageRecord {
    /// Record for the first generation under a key
    pub fn first(key: &UsageKey, now: DateTime<Utc>) -> Self {
        Self {
            kind: key.kind,
            identity_value: key.identity_value.clone(),
            day: key.day,
            generation_count: 1,
            last_used_at: now,
            suspicious: false,
        }
    }

    /// Count one more generation
    pub fn record_generation(&mut self, now: DateTime<Utc>) {
        self.generation_count = self.generation_count.saturating_add(1);
        self.last_used_at = now;
    }

    pub fn key(&self) -> UsageKey {
        UsageKey::new(self.kind, self.identity_value.clone(), self.day)
    }
}

/// Cross-signal linkage for one device fingerprint
///
/// `user_ids` and `ip_hashes` have set semantics: merging an observation the
/// profile already contains is a no-op apart from `last_seen_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintProfile {
    pub fingerprint_hash: String,
    pub user_ids: Vec<UserId>,
    pub ip_hashes: Vec<String>,
    pub is_blocked: bool,
    pub last_seen_at: DateTime<Utc>,
}

impl FingerprintProfile {
    pub fn new(fingerprint_hash: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint_hash: fingerprint_hash.into(),
            user_ids: Vec::new(),
            ip_hashes: Vec::new(),
            is_blocked: false,
            last_seen_at: now,
        }
    }

    /// Merge one observed (ip hash, user id) pair into the profile sets
    pub fn merge_observation(
        &mut self,
        ip_hash: &str,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) {
        if !self.ip_hashes.iter().any(|h| h == ip_hash) {
            self.ip_hashes.push(ip_hash.to_string());
        }
        if let Some(user_id) = user_id
            && !self.user_ids.contains(user_id)
        {
            self.user_ids.push(*user_id);
        }
        self.last_seen_at = now;
    }

    /// Number of distinct user accounts seen with this fingerprint
    pub fn linked_user_count(&self) -> usize {
        self.user_ids.len()
    }
}

/// One entry of the external IP block list (read-only to this crate)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpBlock {
    pub ip_hash: String,
    pub blocked_until: DateTime<Utc>,
}

impl IpBlock {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until > now
    }
}

/// Per-signal slice of an aggregate usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindUsage {
    pub kind: IdentityKind,
    pub generations: u64,
    pub distinct_identities: u64,
    pub suspicious_records: u64,
}

/// Aggregate usage over a date range
///
/// `total_generations` is counted over the ip signal, which is present on
/// every request; summing across kinds would count one generation up to
/// three times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_generations: u64,
    pub by_kind: Vec<KindUsage>,
    pub suspicious_records: u64,
}

impl UsageStats {
    /// Assemble a report from per-kind aggregation rows
    pub fn from_kind_rows(from: NaiveDate, to: NaiveDate, by_kind: Vec<KindUsage>) -> Self {
        let total_generations = by_kind
            .iter()
            .find(|k| k.kind == IdentityKind::Ip)
            .map(|k| k.generations)
            .unwrap_or(0);
        let suspicious_records = by_kind.iter().map(|k| k.suspicious_records).sum();
        Self {
            from,
            to,
            total_generations,
            by_kind,
            suspicious_records,
        }
    }
}

/// Outcome of one retention cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub usage_records_deleted: u64,
    pub ip_blocks_deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_usage_record_first_and_increment() {
        let now = Utc::now();
        let key = UsageKey::ip("aabbccdd", day());
        let mut record = UsageRecord::first(&key, now);
        assert_eq!(record.generation_count, 1);
        assert!(!record.suspicious);

        let later = now + TimeDelta::seconds(5);
        record.record_generation(later);
        assert_eq!(record.generation_count, 2);
        assert_eq!(record.last_used_at, later);
        assert_eq!(record.key(), key);
    }

    #[test]
    fn test_profile_merge_is_set_like() {
        let now = Utc::now();
        let user = UserId::generate();
        let mut profile = FingerprintProfile::new("fp1", now);

        profile.merge_observation("ip1", Some(&user), now);
        profile.merge_observation("ip1", Some(&user), now);
        profile.merge_observation("ip2", None, now);

        assert_eq!(profile.ip_hashes, vec!["ip1".to_string(), "ip2".to_string()]);
        assert_eq!(profile.user_ids, vec![user]);
        assert_eq!(profile.linked_user_count(), 1);
    }

    #[test]
    fn test_ip_block_activity_window() {
        let now = Utc::now();
        let block = IpBlock {
            ip_hash: "h".to_string(),
            blocked_until: now + TimeDelta::hours(1),
        };
        assert!(block.is_active(now));
        assert!(!block.is_active(now + TimeDelta::hours(2)));
    }

    #[test]
    fn test_stats_total_comes_from_ip_kind() {
        let rows = vec![
            KindUsage {
                kind: IdentityKind::Fingerprint,
                generations: 4,
                distinct_identities: 2,
                suspicious_records: 1,
            },
            KindUsage {
                kind: IdentityKind::Ip,
                generations: 5,
                distinct_identities: 3,
                suspicious_records: 0,
            },
        ];
        let stats = UsageStats::from_kind_rows(day(), day(), rows);
        assert_eq!(stats.total_generations, 5);
        assert_eq!(stats.suspicious_records, 1);
    }
}
