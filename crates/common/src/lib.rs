//! Shared data model for the sonde telemetry pipeline.
//!
//! The field names of [`TelemetryItem`] form the one schema that every plugin and
//! transmission channel agrees on, so they serialize exactly as `name`, `iKey`,
//! `time`, `ver`, `baseType` and `baseData`.

pub mod discard;
pub mod item;

pub use discard::DiscardReason;
pub use item::{SCHEMA_VERSION, TelemetryItem, current_timestamp};
