//! Usage tracking application services

pub mod usage_tracking_service;

pub use usage_tracking_service::{SignalCounts, UsageDecision, UsageTrackingService};
