//! Credits domain module
//!
//! Contains the entities, value objects, errors, and storage trait for the
//! per-user points ledger: immutable transaction history, balance accounts,
//! and the atomic apply contract.

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use value_objects::*;
