//! Error types and handling for the revision tree engine
//!
//! Decoding failures are hard errors surfaced through [`Error`]. Rejected
//! mutations are ordinary outcomes that replication hits all the time, so they
//! get their own small enums ([`InsertError`], [`HistoryError`]) instead of
//! being folded into the main error type.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the revision tree engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A persisted revision tree could not be decoded
    #[error("Corrupt revision tree: {0}")]
    CorruptTree(String),

    /// A node record outgrew the 32-bit size field
    #[error("Revision record too large: {0} bytes")]
    RecordTooLarge(usize),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Corruption detected in stored data
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// No stored blob begins at the given offset
    #[error("No stored tree at offset {0}")]
    UnknownOffset(u64),
}

/// Reasons a single-revision insert was not applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// The revision is already in the tree
    #[error("revision already exists")]
    Duplicate,

    /// The named parent revision is not in the tree
    #[error("parent revision not found")]
    UnknownParent,

    /// The parent already has children and conflicts were not allowed
    #[error("parent revision is not a leaf")]
    ParentNotLeaf,

    /// The new or parent revision ID has no parseable generation
    #[error("invalid revision ID")]
    InvalidRevId,

    /// The new generation is not exactly one above the parent's
    #[error("generation mismatch: expected {expected}, got {actual}")]
    GenerationMismatch {
        /// Generation the new revision should have had
        expected: u32,
        /// Generation it actually has
        actual: u32,
    },

    /// A root revision was offered to a non-empty tree without conflict allowance
    #[error("tree already has a root")]
    NotEmpty,

    /// The revision ID does not fit the one-byte length field
    #[error("revision ID too long: {0} bytes")]
    RevIdTooLong(usize),

    /// The body would not fit a record's 32-bit size field
    #[error("revision body too large: {0} bytes")]
    BodyTooLarge(usize),

    /// The tree is at its 16-bit node limit
    #[error("too many revisions in tree")]
    TooManyRevisions,
}

/// Reasons a history insert was not applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Empty chain, unparseable ID, or a gap in the generation sequence
    #[error("malformed revision history")]
    Malformed,

    /// The tip body would not fit a record's 32-bit size field
    #[error("revision body too large: {0} bytes")]
    BodyTooLarge(usize),

    /// Inserting the chain would exceed the 16-bit node limit
    #[error("too many revisions in tree")]
    TooManyRevisions,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a corrupt tree error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptTree(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Check if this error means persisted data is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptTree(_) | Error::Storage(StorageError::Corruption(_))
        )
    }
}
