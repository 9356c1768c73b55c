//! Persisted data model
//!
//! - `usage`: the usage document and its session records
//! - `coerce`: lenient JSON scalar coercion shared by the handlers and the OTEL extractor

pub mod coerce;
pub mod usage;

pub use usage::{now_timestamp, SessionRecord, UsageDocument};
