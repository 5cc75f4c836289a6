//! Domain Layer - Core business logic and entities
//!
//! This module contains the domain entities, value objects, errors, and
//! storage traits behind quota enforcement and the credits ledger.

pub mod credits;
pub mod identity;

// Re-export common types from both modules
// Note: Both modules have sub-modules with similar names (entities, errors, repositories, value_objects)
// Use explicit paths like `domain::credits::entities::CreditsTransaction` to avoid ambiguity
#[allow(ambiguous_glob_reexports)]
pub use credits::*;
#[allow(ambiguous_glob_reexports)]
pub use identity::*;
