//! Shared utilities: error types, logging helpers and retry logic.

pub mod error;
pub mod logging;
pub mod retry;
