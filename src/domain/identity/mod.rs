//! Identity and usage-tracking domain module
//!
//! Contains the value objects, entities, errors, and storage trait behind
//! the daily free-quota enforcement: per-identity usage counters, device
//! fingerprint profiles, and the read-only ip block list.

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use value_objects::*;
