//! Application setup and wiring

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::application::{CreditsLedgerService, ManipulationDetector, UsageTrackingService};
use crate::config::{Config, StorageBackend};
use crate::domain::credits::repositories::CreditsStore;
use crate::domain::identity::repositories::UsageStore;
use crate::infrastructure::{
    IdentityHasher, InMemoryCreditsStore, InMemoryUsageStore, SqlxCreditsStore, SqlxUsageStore,
};

/// Handle bundling the wired metering services
pub struct MeteringCore {
    pub usage: Arc<UsageTrackingService>,
    pub ledger: Arc<CreditsLedgerService>,
    pub detector: Arc<ManipulationDetector>,
}

/// Error type for application wiring
#[derive(Debug, thiserror::Error)]
pub enum CoreBuildError {
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Wire storage, services and the background cleanup task from configuration
pub async fn build_core(config: Config) -> Result<MeteringCore, CoreBuildError> {
    let (usage_store, credits_store): (Arc<dyn UsageStore>, Arc<dyn CreditsStore>) =
        match config.storage.backend {
            StorageBackend::Postgres => {
                // Initialize database pool
                let db_pool = Arc::new(
                    PgPoolOptions::new()
                        .max_connections(config.database.max_connections)
                        .min_connections(config.database.min_idle.unwrap_or(0))
                        .acquire_timeout(std::time::Duration::from_secs(
                            config.database.connect_timeout_seconds,
                        ))
                        .max_lifetime(
                            config
                                .database
                                .max_lifetime_seconds
                                .map(std::time::Duration::from_secs),
                        )
                        .idle_timeout(
                            config
                                .database
                                .idle_timeout_seconds
                                .map(std::time::Duration::from_secs),
                        )
                        .test_before_acquire(config.database.enable_health_checks)
                        .connect(&config.database.url)
                        .await
                        .map_err(|e| {
                            tracing::error!("Failed to connect to Postgres: {}", e);
                            e
                        })?,
                );

                (
                    Arc::new(SqlxUsageStore::new(db_pool.clone())),
                    Arc::new(SqlxCreditsStore::new(
                        db_pool,
                        config.ledger.initial_balance,
                    )),
                )
            }
            StorageBackend::Memory => {
                tracing::info!("Using in-memory storage; state is lost on restart");
                (
                    Arc::new(InMemoryUsageStore::new()),
                    Arc::new(
                        InMemoryCreditsStore::new(config.ledger.initial_balance)
                            .with_max_retries(config.ledger.max_apply_retries),
                    ),
                )
            }
        };

    let hasher = IdentityHasher::from_config(&config.hasher);

    let usage = Arc::new(UsageTrackingService::new(
        usage_store,
        hasher,
        config.quota.clone(),
    ));
    let ledger = Arc::new(CreditsLedgerService::new(credits_store.clone()));
    let detector = Arc::new(ManipulationDetector::new(
        credits_store,
        config.detection.clone(),
    ));

    // Spawn the periodic retention purge
    usage.clone().start_cleanup_task();

    Ok(MeteringCore {
        usage,
        ledger,
        detector,
    })
}
