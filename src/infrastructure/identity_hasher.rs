//! Day-scoped salted identity hashing
//!
//! Raw IPs are never stored or logged. Each ip is hashed together with a
//! secret salt and the index of the current rotation period, so the same ip
//! maps to the same hash within a period and to an unrelated hash in the
//! next one. With the default 24 h rotation the periods align with UTC
//! calendar days, matching the daily quota window.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::HasherConfig;

const SECONDS_PER_HOUR: u64 = 3600;

/// Salted, period-rotating ip hasher
#[derive(Debug, Clone)]
pub struct IdentityHasher {
    salt: String,
    rotation_hours: u32,
}

impl IdentityHasher {
    pub fn new(salt: impl Into<String>, rotation_hours: u32) -> Self {
        Self {
            salt: salt.into(),
            rotation_hours: rotation_hours.max(1),
        }
    }

    /// Build from configuration, generating a process-local salt when none
    /// is configured
    pub fn from_config(config: &HasherConfig) -> Self {
        if config.salt.is_empty() {
            warn!(
                "No identity hash salt configured, generated a process-local one; \
                 ip hashes will rotate on every restart"
            );
            Self::new(Self::generate_salt(), config.rotation_hours)
        } else {
            Self::new(config.salt.clone(), config.rotation_hours)
        }
    }

    fn generate_salt() -> String {
        hex::encode(rand::random::<[u8; 32]>())
    }

    /// Index of the current rotation period since the Unix epoch
    pub fn current_period(&self) -> u64 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        now / (u64::from(self.rotation_hours) * SECONDS_PER_HOUR)
    }

    /// Hash an ip for the current rotation period
    pub fn hash_ip(&self, ip: &str) -> String {
        self.hash_ip_for_period(ip, self.current_period())
    }

    /// Hash an ip for a specific rotation period
    pub fn hash_ip_for_period(&self, ip: &str, period: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b":");
        hasher.update(period.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(ip.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..16]) // First 16 bytes (32 hex chars)
    }
}
