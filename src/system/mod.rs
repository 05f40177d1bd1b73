//! System utilities and monitoring
//!
//! Metrics for the revision tree engine live here.

pub mod metrics;
