//! In-memory revision node

use std::cmp::Ordering;
use std::ops::BitOr;

use bytes::Bytes;

use crate::revid;
use crate::types::Sequence;

/// Revision node flag bits
///
/// `LEAF` and `DELETED` survive persistence. `NEW` lives only in memory and
/// marks a revision inserted since the tree was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RevFlags(u8);

impl RevFlags {
    /// No children
    pub const LEAF: Self = Self(0x01);
    /// Deletion tombstone
    pub const DELETED: Self = Self(0x02);
    /// Not yet persisted
    pub const NEW: Self = Self(0x04);
    /// Bits written to the persisted record
    pub(crate) const PERSISTENT: Self = Self(0x01 | 0x02);

    /// No flags set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit pattern
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Keep only the bits in `mask`
    pub(crate) const fn intersection(self, mask: Self) -> Self {
        Self(self.0 & mask.0)
    }

    /// Build from persisted bits, dropping anything non-persistent
    pub(crate) const fn from_persisted(bits: u8) -> Self {
        Self(bits & Self::PERSISTENT.0)
    }

    /// True if every bit in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits in `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits in `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for RevFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Where a revision's body lives
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    /// No body is kept for this revision
    #[default]
    Empty,
    /// The body bytes themselves
    Inline(Bytes),
    /// File offset of an earlier stored tree that still holds the body inline
    Deferred(u64),
}

impl Body {
    /// Inline bytes, if the body is held directly
    pub fn inline(&self) -> Option<&Bytes> {
        match self {
            Body::Inline(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    /// Offset of the older tree that holds this body
    pub fn deferred_offset(&self) -> Option<u64> {
        match *self {
            Body::Deferred(offset) if offset > 0 => Some(offset),
            _ => None,
        }
    }

    pub(crate) fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Body::Empty
        } else {
            Body::Inline(bytes)
        }
    }
}

/// One revision in a [`RevTree`](super::RevTree)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RevNode {
    pub(crate) rev_id: Bytes,
    pub(crate) flags: RevFlags,
    pub(crate) parent: Option<u16>,
    pub(crate) sequence: Sequence,
    pub(crate) body: Body,
}

impl RevNode {
    /// Revision ID bytes, possibly in compacted form
    pub fn rev_id(&self) -> &[u8] {
        &self.rev_id
    }

    /// Flag bits
    pub fn flags(&self) -> RevFlags {
        self.flags
    }

    /// Index of the parent node, if any
    pub fn parent_index(&self) -> Option<usize> {
        self.parent.map(usize::from)
    }

    /// Storage sequence; 0 until the revision is saved
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Body reference
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Generation number, if the ID parses
    pub fn generation(&self) -> Option<u32> {
        revid::parse_compacted(&self.rev_id).map(|parsed| parsed.generation)
    }

    /// No children
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(RevFlags::LEAF)
    }

    /// Deletion tombstone
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(RevFlags::DELETED)
    }

    /// Inserted since the tree was decoded
    #[inline]
    pub fn is_new(&self) -> bool {
        self.flags.contains(RevFlags::NEW)
    }

    /// A leaf that is not a tombstone
    #[inline]
    pub fn is_active(&self) -> bool {
        self.is_leaf() && !self.is_deleted()
    }

    /// Removal marker used by prune/purge until the next compaction
    #[inline]
    pub(crate) fn is_marked(&self) -> bool {
        self.rev_id.is_empty()
    }

    #[inline]
    pub(crate) fn mark(&mut self) {
        self.rev_id = Bytes::new();
    }

    /// Canonical priority: leaves, then live revisions, then the higher ID.
    pub(crate) fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .is_leaf()
            .cmp(&self.is_leaf())
            .then_with(|| self.is_deleted().cmp(&other.is_deleted()))
            .then_with(|| revid::compare(&other.rev_id, &self.rev_id))
    }
}
