//! Ancestry queries used by replication

use super::node::RevNode;
use super::RevTree;
use crate::revid;

impl RevTree {
    /// Ancestors of `rev_id`, nearest first
    ///
    /// Returns at most `max` IDs. The walk stops right after the first ancestor
    /// listed in `known`, since the receiving side already has everything
    /// older than that. An unknown `rev_id` has no history.
    pub fn history(&self, rev_id: &[u8], max: usize, known: &[&[u8]]) -> Vec<&[u8]> {
        let mut ancestors = Vec::new();
        let Some(start) = self.index_of(rev_id) else {
            return ancestors;
        };

        let mut cursor = self.nodes[start].parent_index();
        while let Some(index) = cursor {
            if ancestors.len() >= max {
                break;
            }
            let node = &self.nodes[index];
            ancestors.push(node.rev_id());
            if known.iter().any(|&k| k == node.rev_id()) {
                break;
            }
            cursor = node.parent_index();
        }
        ancestors
    }

    /// Revisions we hold that could be ancestors of a revision we lack
    ///
    /// Anything with a lower generation qualifies. Results come in canonical
    /// priority order, so leaves lead, capped at `limit`. Empty if `rev_id` is
    /// already in the tree or has no parseable generation.
    pub fn possible_ancestors(&self, rev_id: &[u8], limit: usize) -> Vec<&[u8]> {
        if self.index_of(rev_id).is_some() {
            return Vec::new();
        }
        let Some(target) = revid::parse_compacted(rev_id) else {
            return Vec::new();
        };

        let mut candidates: Vec<&RevNode> = self
            .nodes
            .iter()
            .filter(|node| node.generation().is_some_and(|g| g < target.generation))
            .collect();
        candidates.sort_by(|a, b| a.priority_cmp(b));
        candidates.into_iter().take(limit).map(RevNode::rev_id).collect()
    }
}
