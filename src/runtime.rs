//! Runtime glue that wires configuration, retry backoff, telemetry, and
//! runner orchestration.

pub(crate) mod backoff;
pub mod config;
pub mod error;
pub mod runner;
pub mod telemetry;
