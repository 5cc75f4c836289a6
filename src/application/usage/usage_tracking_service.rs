//! Usage tracking service - daily free-quota enforcement
//!
//! Orchestrates the per-request throttle: hashes the caller's ip, looks up
//! today's counters for every present identity signal, and applies the
//! most restrictive count against the tier's daily limit. Storage failures
//! here deny the request; the block-list lookups below fail open instead,
//! because the limit check is the second, independent gate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::config::QuotaConfig;
use crate::domain::identity::{
    GenerationTier, PurgeSummary, TrackingError, TrackingMethod, UsageKey, UsageStats, UsageStore,
    UserId, truncate_for_log,
};
use crate::infrastructure::identity_hasher::IdentityHasher;

/// Today's counter per identity signal; absent signals are `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalCounts {
    pub fingerprint: Option<u32>,
    pub ip: u32,
    pub user: Option<u32>,
}

impl SignalCounts {
    /// The winning (most restrictive) count across present signals
    pub fn winning(&self) -> u32 {
        self.ip
            .max(self.fingerprint.unwrap_or(0))
            .max(self.user.unwrap_or(0))
    }
}

/// Outcome of a daily limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Which signal produced the winning count; `Multiple` on ties
    pub tracking_method: TrackingMethod,
    pub signals: SignalCounts,
}

impl UsageDecision {
    /// Build a decision from the per-signal counters
    pub fn from_counts(limit: u32, signals: SignalCounts) -> Self {
        let mut candidates: Vec<(TrackingMethod, u32)> = vec![(TrackingMethod::Ip, signals.ip)];
        if let Some(count) = signals.fingerprint {
            candidates.push((TrackingMethod::Fingerprint, count));
        }
        if let Some(count) = signals.user {
            candidates.push((TrackingMethod::User, count));
        }

        let winning = signals.winning();
        let mut winners = candidates.iter().filter(|(_, count)| *count == winning);
        let tracking_method = match (winners.next(), winners.next()) {
            (Some((method, _)), None) => *method,
            _ => TrackingMethod::Multiple,
        };

        Self {
            allowed: winning < limit,
            limit,
            remaining: limit.saturating_sub(winning),
            tracking_method,
            signals,
        }
    }

    /// Denied decision used when storage cannot be consulted
    pub fn fail_secure(limit: u32) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            tracking_method: TrackingMethod::Multiple,
            signals: SignalCounts::default(),
        }
    }
}

/// Service enforcing the daily free generation quota
///
/// Holds an injected [`UsageStore`] strategy; no storage backend is assumed
/// or constructed behind the caller's back.
pub struct UsageTrackingService {
    store: Arc<dyn UsageStore>,
    hasher: IdentityHasher,
    quota: QuotaConfig,
}

impl UsageTrackingService {
    /// Create a new usage tracking service
    pub fn new(store: Arc<dyn UsageStore>, hasher: IdentityHasher, quota: QuotaConfig) -> Self {
        Self {
            store,
            hasher,
            quota,
        }
    }

    fn daily_limit(&self, tier: GenerationTier) -> u32 {
        match tier {
            GenerationTier::Standard => self.quota.daily_free_limit,
            GenerationTier::Premium => self.quota.premium_daily_limit,
        }
    }

    /// Check whether one more generation is allowed today
    ///
    /// Present signals are looked up concurrently and the highest count
    /// wins. Any storage failure denies the request; errors never surface
    /// to the caller and never default to permissive.
    #[instrument(skip_all, fields(
        tier = %tier,
        has_fingerprint = fingerprint_hash.is_some(),
        has_user = user_id.is_some()
    ))]
    pub async fn check_usage_limit(
        &self,
        fingerprint_hash: Option<&str>,
        ip: &str,
        user_id: Option<UserId>,
        tier: GenerationTier,
    ) -> UsageDecision {
        let limit = self.daily_limit(tier);
        let today = Utc::now().date_naive();
        let ip_hash = self.hasher.hash_ip(ip);

        let fingerprint_fut = async {
            match fingerprint_hash {
                Some(hash) => self
                    .store
                    .usage_count(&UsageKey::fingerprint(hash, today))
                    .await
                    .map(|count| Some(count.unwrap_or(0))),
                None => Ok(None),
            }
        };
        let ip_fut = async {
            self.store
                .usage_count(&UsageKey::ip(ip_hash.as_str(), today))
                .await
                .map(|count| count.unwrap_or(0))
        };
        let user_fut = async {
            match user_id.as_ref() {
                Some(user) => self
                    .store
                    .usage_count(&UsageKey::user(user, today))
                    .await
                    .map(|count| Some(count.unwrap_or(0))),
                None => Ok(None),
            }
        };

        let signals = match tokio::join!(fingerprint_fut, ip_fut, user_fut) {
            (Ok(fingerprint), Ok(ip), Ok(user)) => SignalCounts {
                fingerprint,
                ip,
                user,
            },
            (fingerprint, ip, user) => {
                let error = fingerprint.err().or(ip.err()).or(user.err());
                warn!(
                    error = ?error,
                    "Usage lookup failed, denying request (fail secure)"
                );
                return UsageDecision::fail_secure(limit);
            }
        };

        let decision = UsageDecision::from_counts(limit, signals);
        if !decision.allowed {
            debug!(
                method = %decision.tracking_method,
                limit = decision.limit,
                "Daily generation limit reached"
            );
        }
        decision
    }

    /// Record one completed generation against every present signal
    ///
    /// Each per-signal upsert is individually atomic; a failing signal is
    /// logged and does not stop the others. The first error is returned
    /// after all signals were attempted so callers never double-record.
    #[instrument(skip_all, fields(
        has_fingerprint = fingerprint_hash.is_some(),
        has_user = user_id.is_some()
    ))]
    pub async fn record_generation(
        &self,
        fingerprint_hash: Option<&str>,
        ip: &str,
        user_id: Option<UserId>,
        user_agent: Option<&str>,
    ) -> Result<(), TrackingError> {
        let now = Utc::now();
        let today = now.date_naive();
        let ip_hash = self.hasher.hash_ip(ip);
        let mut first_error = None;

        let mut keys = vec![UsageKey::ip(ip_hash.as_str(), today)];
        if let Some(hash) = fingerprint_hash {
            keys.push(UsageKey::fingerprint(hash, today));
        }
        if let Some(user) = user_id.as_ref() {
            keys.push(UsageKey::user(user, today));
        }

        for key in &keys {
            if let Err(e) = self.store.increment_usage(key, now).await {
                warn!(kind = %key.kind, error = %e, "Failed to record generation for signal");
                first_error.get_or_insert(e);
            }
        }

        if let Some(hash) = fingerprint_hash {
            match self
                .store
                .upsert_fingerprint_profile(hash, ip_hash.as_str(), user_id.as_ref(), now)
                .await
            {
                Ok(profile) => {
                    if profile.linked_user_count() >= self.quota.suspicious_user_threshold {
                        warn!(
                            fingerprint = truncate_for_log(hash),
                            linked_users = profile.linked_user_count(),
                            "Fingerprint linked to multiple accounts, flagging usage"
                        );
                        if let Err(e) = self
                            .store
                            .mark_suspicious(&UsageKey::fingerprint(hash, today))
                            .await
                        {
                            warn!(error = %e, "Failed to flag suspicious usage record");
                            first_error.get_or_insert(e);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to update fingerprint profile");
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(user_agent = user_agent.unwrap_or(""), "Generation recorded");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether the caller's ip is on the active block list (fails open)
    pub async fn is_ip_blocked(&self, ip: &str) -> bool {
        let ip_hash = self.hasher.hash_ip(ip);
        match self.store.active_ip_block(ip_hash.as_str(), Utc::now()).await {
            Ok(block) => block.is_some(),
            Err(e) => {
                warn!(error = %e, "Ip block lookup failed, allowing request (fail open)");
                false
            }
        }
    }

    /// Whether the fingerprint is blocked (fails open)
    pub async fn is_fingerprint_blocked(&self, fingerprint_hash: &str) -> bool {
        match self.store.fingerprint_profile(fingerprint_hash).await {
            Ok(profile) => profile.map(|p| p.is_blocked).unwrap_or(false),
            Err(e) => {
                warn!(
                    error = %e,
                    "Fingerprint block lookup failed, allowing request (fail open)"
                );
                false
            }
        }
    }

    /// Aggregate usage over an inclusive date range (offline reporting path)
    #[instrument(skip(self))]
    pub async fn usage_stats(
        &self,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<UsageStats, TrackingError> {
        self.store.stats(from, to).await
    }

    /// Delete usage records older than the retention window and expired ip
    /// blocks
    pub async fn purge_expired(&self) -> Result<PurgeSummary, TrackingError> {
        let now = Utc::now();
        let cutoff = now.date_naive() - chrono::Days::new(u64::from(self.quota.retention_days));

        let usage_records_deleted = self.store.purge_usage_before(cutoff).await?;
        let ip_blocks_deleted = self.store.purge_ip_blocks_before(now).await?;

        info!(
            usage_records_deleted,
            ip_blocks_deleted, "Retention cleanup completed"
        );
        Ok(PurgeSummary {
            usage_records_deleted,
            ip_blocks_deleted,
        })
    }

    /// Start a background task that runs retention cleanup periodically
    pub fn start_cleanup_task(self: Arc<Self>) {
        let cleanup_interval = Duration::from_secs(self.quota.cleanup_interval_seconds);

        tokio::spawn(async move {
            let mut interval = interval(cleanup_interval);

            loop {
                interval.tick().await;
                if let Err(e) = self.purge_expired().await {
                    warn!(error = %e, "Retention cleanup failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::usage::InMemoryUsageStore;

    fn test_quota() -> QuotaConfig {
        QuotaConfig {
            daily_free_limit: 3,
            premium_daily_limit: 1,
            retention_days: 30,
            cleanup_interval_seconds: 3600,
            suspicious_user_threshold: 3,
        }
    }

    fn test_service() -> (UsageTrackingService, Arc<InMemoryUsageStore>) {
        let store = Arc::new(InMemoryUsageStore::new());
        let service = UsageTrackingService::new(
            store.clone(),
            IdentityHasher::new("unit-test-salt", 24),
            test_quota(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_fresh_identity_gets_full_allowance() {
        let (service, _) = test_service();
        let decision = service
            .check_usage_limit(None, "203.0.113.9", None, GenerationTier::Standard)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.remaining, 3);
        assert_eq!(decision.tracking_method, TrackingMethod::Ip);
    }

    #[tokio::test]
    async fn test_remaining_shrinks_as_generations_are_recorded() {
        let (service, _) = test_service();
        let ip = "203.0.113.10";

        for expected_remaining in [2u32, 1, 0] {
            service.record_generation(None, ip, None, None).await.unwrap();
            let decision = service
                .check_usage_limit(None, ip, None, GenerationTier::Standard)
                .await;
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = service
            .check_usage_limit(None, ip, None, GenerationTier::Standard)
            .await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_most_restrictive_signal_wins() {
        let (service, _) = test_service();
        let exhausted_ip = "203.0.113.11";
        let fresh_ip = "203.0.113.12";
        let fingerprint = "fp-max-signal";

        // Exhaust the fingerprint on one ip, then present it from another
        for _ in 0..3 {
            service
                .record_generation(Some(fingerprint), exhausted_ip, None, None)
                .await
                .unwrap();
        }

        let decision = service
            .check_usage_limit(Some(fingerprint), fresh_ip, None, GenerationTier::Standard)
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.tracking_method, TrackingMethod::Fingerprint);
    }

    #[tokio::test]
    async fn test_tied_signals_report_multiple() {
        let (service, _) = test_service();
        let ip = "203.0.113.13";
        let fingerprint = "fp-tied";

        service
            .record_generation(Some(fingerprint), ip, None, None)
            .await
            .unwrap();

        let decision = service
            .check_usage_limit(Some(fingerprint), ip, None, GenerationTier::Standard)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.signals.fingerprint, Some(1));
        assert_eq!(decision.signals.ip, 1);
        assert_eq!(decision.tracking_method, TrackingMethod::Multiple);
    }

    #[tokio::test]
    async fn test_premium_tier_uses_premium_limit() {
        let (service, _) = test_service();
        let ip = "203.0.113.14";

        service.record_generation(None, ip, None, None).await.unwrap();

        let premium = service
            .check_usage_limit(None, ip, None, GenerationTier::Premium)
            .await;
        assert!(!premium.allowed);
        assert_eq!(premium.limit, 1);

        let standard = service
            .check_usage_limit(None, ip, None, GenerationTier::Standard)
            .await;
        assert!(standard.allowed);
    }

    #[tokio::test]
    async fn test_multi_account_fingerprint_flagged() {
        let (service, store) = test_service();
        let ip = "203.0.113.15";
        let fingerprint = "fp-shared";

        for _ in 0..3 {
            service
                .record_generation(Some(fingerprint), ip, Some(UserId::generate()), None)
                .await
                .unwrap();
        }

        let today = Utc::now().date_naive();
        let record = store
            .usage_record(&UsageKey::fingerprint(fingerprint, today))
            .await
            .unwrap()
            .expect("fingerprint record should exist");
        assert!(record.suspicious);
    }

    #[tokio::test]
    async fn test_unblocked_lookups_return_false() {
        let (service, _) = test_service();
        assert!(!service.is_ip_blocked("203.0.113.16").await);
        assert!(!service.is_fingerprint_blocked("fp-unknown").await);
    }
}
