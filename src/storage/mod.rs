//! Storage layer for revision trees
//!
//! A revision tree is persisted as one opaque blob per document. The store
//! assigns every write a fresh sequence and an offset, and keeps older blobs
//! reachable by offset so bodies dropped from non-leaf revisions can still be
//! fetched from the version of the document that carried them.

use crate::types::{Result, Sequence};
use bytes::Bytes;

pub mod mem_store;

pub use mem_store::MemStore;

/// One stored version of a document's revision tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTree {
    /// Encoded tree
    pub bytes: Bytes,
    /// Sequence assigned when this version was written
    pub sequence: Sequence,
    /// Where this version lives; never 0
    pub offset: u64,
}

/// Trait for revision tree storage implementations
///
/// Implementations must serialize writers to the same document. Readers may
/// run concurrently with each other and with writers to other documents.
pub trait TreeStorage: Send + Sync {
    /// Get the current version of a document
    ///
    /// # Arguments
    ///
    /// * `doc_id` - The document identifier
    ///
    /// # Returns
    ///
    /// * `Some(StoredTree)` - The latest stored version
    /// * `None` - If the document was never written
    fn read(&self, doc_id: &str) -> Option<StoredTree>;

    /// Get whichever version was written at `offset`
    ///
    /// # Arguments
    ///
    /// * `offset` - An offset previously returned by a write
    ///
    /// # Returns
    ///
    /// * `Ok(StoredTree)` - The version stored there
    /// * `Err(Error::Storage)` - If nothing was written at that offset
    fn read_at(&self, offset: u64) -> Result<StoredTree>;

    /// Store a new version of a document
    ///
    /// # Arguments
    ///
    /// * `doc_id` - The document identifier
    /// * `bytes` - The encoded tree
    ///
    /// # Returns
    ///
    /// * `Ok(StoredTree)` - The new version with its sequence and offset
    fn write(&self, doc_id: &str, bytes: Bytes) -> Result<StoredTree>;

    /// Number of documents with at least one stored version
    fn document_count(&self) -> usize;
}
