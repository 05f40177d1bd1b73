//! Type definitions for the revision tree engine
//!
//! This module contains the shared error taxonomy and identifier aliases.

/// System-wide error types
pub mod error;

/// Document identifier used as the storage key
pub type DocId = String;

/// Storage sequence number; 0 means not yet assigned
pub type Sequence = u64;

// Re-export commonly used types for convenience
pub use error::{Error, HistoryError, InsertError, Result, StorageError};
