//! Pixora Metering - Quota enforcement and points ledger for the Pixora platform
//!
//! This crate decides whether a generation request may run and accounts for
//! the points it costs:
//!
//! # Modules
//!
//! - [`config`] — Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] — Usage, identity and ledger domain models
//! - [`application`] — Usage tracking, credits ledger and manipulation detection services
//! - [`infrastructure`] — Identity hashing plus Postgres and in-memory storage backends
//! - [`logging`] — Structured logging with tracing
//!
//! # Architecture
//!
//! The crate follows Domain-Driven Design principles:
//!
//! ```text
//! pixora-metering/
//! ├── domain/           # Pure business logic
//! │   ├── identity/     # Usage records, fingerprints, tracking keys
//! │   └── credits/      # Accounts and immutable ledger transactions
//! ├── application/      # Use cases and services
//! ├── infrastructure/   # Storage backends and identity hashing
//! └── config/           # Configuration management
//! ```
//!
//! # Usage
//!
//! Wire everything from configuration and drive the services directly:
//!
//! ```rust,ignore
//! use pixora_metering::{Config, build_core, init_tracing};
//!
//! let config = Config::load()?;
//! init_tracing(&config.logging)?;
//! let core = build_core(config).await?;
//!
//! let decision = core
//!     .usage
//!     .check_usage_limit(None, client_ip, None, GenerationTier::Standard)
//!     .await;
//! ```
//!
//! Environment variables use the `PIXORA__` prefix with double underscore separators:
//!
//! ```bash
//! PIXORA__QUOTA__DAILY_FREE_LIMIT=3
//! PIXORA__STORAGE__BACKEND=memory
//! ```

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use app::{CoreBuildError, MeteringCore, build_core};
pub use config::Config;
pub use logging::init_tracing;
