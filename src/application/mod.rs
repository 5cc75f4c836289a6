//! Application Layer - Use cases and application services

pub mod credits;
pub mod usage;

#[allow(ambiguous_glob_reexports)]
pub use credits::*;
#[allow(ambiguous_glob_reexports)]
pub use usage::*;
