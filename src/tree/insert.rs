//! Adding revisions

use bytes::Bytes;
use tracing::debug;

use super::node::{Body, RevFlags, RevNode};
use super::{RevTree, MAX_BODY_LEN, MAX_NODES, MAX_REV_ID_LEN};
use crate::revid;
use crate::system::metrics::Metrics;
use crate::types::{HistoryError, InsertError};

impl RevTree {
    /// Add one revision as a child of `parent_id`, or as a root if `None`
    ///
    /// The new generation must be exactly one above the parent's (a root must
    /// be generation 1). Without `allow_conflict` the parent has to be a leaf
    /// and a root can only go into an empty tree. Returns the new node's
    /// index.
    pub fn insert(
        &mut self,
        rev_id: &[u8],
        body: &[u8],
        deleted: bool,
        parent_id: Option<&[u8]>,
        allow_conflict: bool,
    ) -> Result<usize, InsertError> {
        let metrics = Metrics::global();
        match self.check_insert(rev_id, body.len(), parent_id, allow_conflict) {
            Ok(parent) => {
                metrics.tree.revisions_inserted.inc();
                Ok(self.append(rev_id, body, deleted, parent))
            }
            Err(reason) => {
                debug!(rev_id = %String::from_utf8_lossy(rev_id), %reason, "insert rejected");
                metrics.tree.inserts_rejected.inc();
                Err(reason)
            }
        }
    }

    /// Add a chain of ancestry, newest first
    ///
    /// `history[0]` is the new revision and each following entry is its
    /// parent, one generation lower. Walks the chain until it meets a revision
    /// already in the tree, then inserts everything newer than that, oldest
    /// first. Only the newest revision gets `body` and `deleted`; the ones in
    /// between are bodiless placeholders.
    ///
    /// Returns the chain position of the common ancestor: 0 if the newest
    /// revision was already present (nothing inserted), `history.len()` if
    /// the chain shares nothing with the tree.
    pub fn insert_history(
        &mut self,
        history: &[&[u8]],
        body: &[u8],
        deleted: bool,
    ) -> Result<usize, HistoryError> {
        if history.is_empty() {
            return Err(HistoryError::Malformed);
        }
        if body.len() > MAX_BODY_LEN {
            return Err(HistoryError::BodyTooLarge(body.len()));
        }

        let mut last_generation = 0;
        let mut ancestor = None;
        let mut found_at = history.len();
        for (i, &rev_id) in history.iter().enumerate() {
            let generation = revid::parse_compacted(rev_id)
                .map(|parsed| parsed.generation)
                .filter(|&generation| generation > 0)
                .ok_or(HistoryError::Malformed)?;
            if last_generation > 0 && generation + 1 != last_generation {
                return Err(HistoryError::Malformed);
            }
            last_generation = generation;

            if let Some(index) = self.index_of(rev_id) {
                ancestor = Some(index);
                found_at = i;
                break;
            }
            if rev_id.len() > MAX_REV_ID_LEN {
                return Err(HistoryError::Malformed);
            }
        }

        if self.nodes.len() + found_at > MAX_NODES {
            return Err(HistoryError::TooManyRevisions);
        }

        let mut parent = ancestor;
        for i in (0..found_at).rev() {
            let (body, deleted) = if i == 0 { (body, deleted) } else { (&[][..], false) };
            parent = Some(self.append(history[i], body, deleted, parent));
        }
        if found_at > 0 {
            Metrics::global().tree.revisions_inserted.inc_by(found_at as u64);
            debug!(inserted = found_at, "inserted revision history");
        }
        Ok(found_at)
    }

    /// Validate a single insert, returning the parent's index
    pub(super) fn check_insert(
        &self,
        rev_id: &[u8],
        body_len: usize,
        parent_id: Option<&[u8]>,
        allow_conflict: bool,
    ) -> Result<Option<usize>, InsertError> {
        if self.index_of(rev_id).is_some() {
            return Err(InsertError::Duplicate);
        }
        let parent = match parent_id {
            Some(parent_id) => Some(self.index_of(parent_id).ok_or(InsertError::UnknownParent)?),
            None => None,
        };
        if rev_id.len() > MAX_REV_ID_LEN {
            return Err(InsertError::RevIdTooLong(rev_id.len()));
        }
        if body_len > MAX_BODY_LEN {
            return Err(InsertError::BodyTooLarge(body_len));
        }
        if self.nodes.len() >= MAX_NODES {
            return Err(InsertError::TooManyRevisions);
        }

        let generation = revid::parse_compacted(rev_id)
            .ok_or(InsertError::InvalidRevId)?
            .generation;

        let parent_generation = match parent {
            Some(index) => {
                let parent_node = &self.nodes[index];
                if !allow_conflict && !parent_node.is_leaf() {
                    return Err(InsertError::ParentNotLeaf);
                }
                parent_node.generation().ok_or(InsertError::InvalidRevId)?
            }
            None => {
                if !allow_conflict && !self.nodes.is_empty() {
                    return Err(InsertError::NotEmpty);
                }
                0
            }
        };

        if generation != parent_generation + 1 {
            return Err(InsertError::GenerationMismatch {
                expected: parent_generation + 1,
                actual: generation,
            });
        }
        Ok(parent)
    }

    /// Push a new leaf, copying its ID and body into tree-owned buffers
    fn append(&mut self, rev_id: &[u8], body: &[u8], deleted: bool, parent: Option<usize>) -> usize {
        let mut flags = RevFlags::LEAF | RevFlags::NEW;
        if deleted {
            flags.insert(RevFlags::DELETED);
        }
        if let Some(parent) = parent {
            self.nodes[parent].flags.remove(RevFlags::LEAF);
        }

        self.nodes.push(RevNode {
            rev_id: Bytes::copy_from_slice(rev_id),
            flags,
            parent: parent.map(|p| p as u16),
            sequence: 0,
            body: Body::from_bytes(Bytes::copy_from_slice(body)),
        });

        self.changed = true;
        if self.nodes.len() > 1 {
            self.sorted = false;
        }
        self.nodes.len() - 1
    }
}
