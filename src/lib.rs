//! VIGIL — resilient market-data acquisition and options signal alerting.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod clock;
pub mod config;
pub mod types;
pub mod data;
pub mod model;
pub mod notify;
pub mod engine;
pub mod storage;
pub mod dashboard;
