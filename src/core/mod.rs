//! Core foundations
//!
//! Configuration shared by the tree, the store and logging setup.

pub mod config;

pub use config::{Config, LoggingConfig, StorageConfig, TreeConfig};
