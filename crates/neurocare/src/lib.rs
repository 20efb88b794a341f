//! Verification backbone of the neurocare educator marketplace.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
