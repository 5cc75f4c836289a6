//! Credits ledger application services

pub mod ledger_service;
pub mod manipulation_detector;

pub use ledger_service::{CreditsHistory, CreditsLedgerService, LedgerDenial, LedgerReceipt};
pub use manipulation_detector::{ManipulationDetector, ManipulationReason, ManipulationReport};
