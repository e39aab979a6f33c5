//! Command implementations for the CLI
//!
//! - serve: Start the telemetry server
//! - config: Configuration display and validation

pub mod config;
pub mod serve;
