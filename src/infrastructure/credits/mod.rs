//! Credits ledger storage implementations
//!
//! Two [`CreditsStore`](crate::domain::credits::CreditsStore) strategies:
//! [`SqlxCreditsStore`] serializes per-user mutations with database
//! transactions and row locks; [`InMemoryCreditsStore`] uses an optimistic
//! version check with bounded retries. Both write balance update and
//! transaction row as one all-or-nothing unit.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCreditsStore;
pub use postgres::SqlxCreditsStore;
