//! Identity domain value objects

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID value object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new UserId from UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a new random UserId
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Get as string
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<UserId> for Uuid {
    fn from(user_id: UserId) -> Self {
        user_id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity signal a usage counter is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    /// Client-computed device fingerprint hash
    Fingerprint,
    /// Day-salted hash of the request IP
    Ip,
    /// Authenticated user id
    User,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Fingerprint => "fingerprint",
            IdentityKind::Ip => "ip",
            IdentityKind::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fingerprint" => Some(IdentityKind::Fingerprint),
            "ip" => Some(IdentityKind::Ip),
            "user" => Some(IdentityKind::User),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which signal produced the winning (most restrictive) count in a limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMethod {
    Fingerprint,
    Ip,
    User,
    /// Two or more present signals tied at the winning count
    Multiple,
}

impl TrackingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMethod::Fingerprint => "fingerprint",
            TrackingMethod::Ip => "ip",
            TrackingMethod::User => "user",
            TrackingMethod::Multiple => "multiple",
        }
    }
}

impl fmt::Display for TrackingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<IdentityKind> for TrackingMethod {
    fn from(kind: IdentityKind) -> Self {
        match kind {
            IdentityKind::Fingerprint => TrackingMethod::Fingerprint,
            IdentityKind::Ip => TrackingMethod::Ip,
            IdentityKind::User => TrackingMethod::User,
        }
    }
}

/// Generation tier selecting which daily limit applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationTier {
    /// Standard model generations
    #[default]
    Standard,
    /// Premium model generations (tighter free allowance)
    Premium,
}

impl GenerationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTier::Standard => "standard",
            GenerationTier::Premium => "premium",
        }
    }
}

impl fmt::Display for GenerationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key of one per-identity per-day usage counter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageKey {
    pub kind: IdentityKind,
    pub identity_value: String,
    pub day: NaiveDate,
}

impl UsageKey {
    pub fn new(kind: IdentityKind, identity_value: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            kind,
            identity_value: identity_value.into(),
            day,
        }
    }

    pub fn fingerprint(hash: impl Into<String>, day: NaiveDate) -> Self {
        Self::new(IdentityKind::Fingerprint, hash, day)
    }

    pub fn ip(hash: impl Into<String>, day: NaiveDate) -> Self {
        Self::new(IdentityKind::Ip, hash, day)
    }

    pub fn user(user_id: &UserId, day: NaiveDate) -> Self {
        Self::new(IdentityKind::User, user_id.as_str(), day)
    }
}

/// Truncate an identifier for log output so raw values never land in logs
pub fn truncate_for_log(value: &str) -> &str {
    match value.char_indices().nth(8) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
