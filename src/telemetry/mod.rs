//! Process-wide tracing setup for the indexer binary.
//!
//! The library never installs a subscriber on its own; embedding applications
//! and tests either call [`init_telemetry`] or bring their own.

pub mod config;
pub mod subscriber;

pub use config::TelemetryConfig;
pub use subscriber::{TelemetryGuard, init_telemetry};
