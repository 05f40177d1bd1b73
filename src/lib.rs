//! Massive RevTree - conflict-aware revision trees for replicated documents
//!
//! Every document in a replicated store carries a tree of its revisions.
//! This crate decodes that tree from its compact persisted form, answers the
//! questions replication asks of it (which revision wins, is there a
//! conflict, what history precedes a revision), applies local edits and
//! pulled histories, prunes it to a bounded depth, and encodes it back.
#![warn(missing_docs)]

// Foundations
pub mod core;
pub mod types;
pub mod codec;

// Revision trees
pub mod revid;
pub mod tree;

// Persistence and monitoring
pub mod storage;
pub mod system;

// Re-export commonly used items for convenience
pub use crate::core::{Config, LoggingConfig};
pub use storage::{MemStore, StoredTree, TreeStorage};
pub use tree::{Body, RevFlags, RevNode, RevTree};
pub use types::{Error, HistoryError, InsertError, Result};

use tracing_subscriber::EnvFilter;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing and metrics
///
/// `RUST_LOG` takes precedence over the configured level. Calling this again,
/// or after the host installed its own subscriber, leaves the existing
/// subscriber in place.
pub fn init(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| Error::config(format!("Invalid log level: {}", e)))?;

    let installed = match logging.format.as_str() {
        "compact" => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
    };
    if installed.is_ok() {
        tracing::info!("Initializing {} v{}", NAME, VERSION);
    }

    system::metrics::init_registry();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        let logging = LoggingConfig::default();
        assert!(init(&logging).is_ok());
        assert!(init(&logging).is_ok());
    }
}
