//! Infrastructure Layer - External concerns and implementations
//!
//! This module holds the storage backends and the hashing primitive the
//! services are wired with.

pub mod credits;
pub mod identity_hasher;
pub mod usage;

// Re-export specific items to avoid ambiguous glob conflicts
pub use credits::{InMemoryCreditsStore, SqlxCreditsStore};
pub use identity_hasher::IdentityHasher;
pub use usage::{InMemoryUsageStore, SqlxUsageStore};
