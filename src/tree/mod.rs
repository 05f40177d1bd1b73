//! Revision trees
//!
//! A [`RevTree`] holds every known revision of one document in a flat node
//! table. Parent links are 16-bit indexes into that table, which is also how
//! they are persisted. Anything that reorders or removes nodes (sort, prune,
//! purge) rebuilds the links through an old-to-new index table.
//!
//! Lifecycle: decode the stored blob with [`RevTree::decode`], query or mutate
//! it, then [`RevTree::encode`] it back for the storage layer.
//!
//! Revision IDs and bodies of decoded nodes are [`Bytes`] slices of the
//! source buffer, so the buffer lives as long as any node references it.
//! Inserted revisions are always copied into fresh allocations.

use bytes::Bytes;

mod ancestry;
mod insert;
mod node;
mod prune;
mod raw;
mod sort;


pub use node::{Body, RevFlags, RevNode};

/// Most nodes a tree can hold; parent links and the persisted format are 16-bit
pub const MAX_NODES: usize = u16::MAX as usize;

/// Longest revision ID the one-byte length field can carry
pub const MAX_REV_ID_LEN: usize = u8::MAX as usize;

/// Largest inline body whose record still fits the 32-bit size field
pub const MAX_BODY_LEN: usize =
    u32::MAX as usize - raw::RECORD_HEADER_LEN - MAX_REV_ID_LEN - crate::codec::MAX_VARINT_LEN;

/// Revision history of a single document
#[derive(Debug, Clone)]
pub struct RevTree {
    nodes: Vec<RevNode>,
    /// Storage offset of the blob this tree was read from
    body_offset: u64,
    sorted: bool,
    changed: bool,
}

impl Default for RevTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RevTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            body_offset: 0,
            sorted: true,
            changed: false,
        }
    }

    /// Number of revisions
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree has no revisions
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over the nodes in table order
    pub fn nodes(&self) -> impl Iterator<Item = &RevNode> + '_ {
        self.nodes.iter()
    }

    /// Look up a revision by ID
    pub fn get(&self, rev_id: &[u8]) -> Option<&RevNode> {
        self.index_of(rev_id).map(|index| &self.nodes[index])
    }

    /// Node at `index`
    pub fn get_by_index(&self, index: usize) -> Option<&RevNode> {
        self.nodes.get(index)
    }

    /// Table index of a revision
    pub fn index_of(&self, rev_id: &[u8]) -> Option<usize> {
        if rev_id.is_empty() {
            return None;
        }
        self.nodes.iter().position(|node| node.rev_id == rev_id)
    }

    /// Parent of the node at `index`
    pub fn parent(&self, index: usize) -> Option<&RevNode> {
        let parent = self.nodes.get(index)?.parent_index()?;
        self.nodes.get(parent)
    }

    /// The winning revision: first node in canonical order
    pub fn current_node(&mut self) -> Option<&RevNode> {
        self.sort();
        self.nodes.first()
    }

    /// Every leaf, deleted or not
    pub fn current_nodes(&self) -> Vec<&RevNode> {
        self.nodes.iter().filter(|node| node.is_leaf()).collect()
    }

    /// True if more than one leaf is live
    pub fn has_conflict(&self) -> bool {
        if self.nodes.len() < 2 {
            false
        } else if self.sorted {
            self.nodes[1].is_active()
        } else {
            self.nodes.iter().filter(|node| node.is_active()).nth(1).is_some()
        }
    }

    /// True once anything has been inserted, pruned or purged
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// True while the table is in canonical order
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Storage offset that pruned bodies will point back to
    pub fn body_offset(&self) -> u64 {
        self.body_offset
    }

    /// Set the storage offset that pruned bodies will point back to
    pub fn set_body_offset(&mut self, offset: u64) {
        self.body_offset = offset;
    }

    /// Revision IDs of all nodes, in table order
    pub fn rev_ids(&self) -> Vec<Bytes> {
        self.nodes.iter().map(|node| node.rev_id.clone()).collect()
    }
}
