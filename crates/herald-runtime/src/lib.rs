#![deny(missing_docs)]
//! Herald runtime helpers.
//!
//! Background loops that run beside inbound message handling.

/// Scheduler tick loop.
pub mod schedule;

pub use schedule::{spawn_schedule_runtime, ScheduleRuntimeConfig, Tick, MIN_INTERVAL};
