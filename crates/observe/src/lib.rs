//! Logging and metrics plumbing shared by the services.

pub mod metrics;
pub mod tracing;
