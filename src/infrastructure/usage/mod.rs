//! Usage-side storage implementations
//!
//! Two [`UsageStore`](crate::domain::identity::UsageStore) strategies:
//! [`SqlxUsageStore`] backed by Postgres for durable multi-instance
//! deployments, and [`InMemoryUsageStore`] for tests and single-instance
//! setups. The backend is selected at composition time and injected into the
//! tracking service.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryUsageStore;
pub use postgres::SqlxUsageStore;
