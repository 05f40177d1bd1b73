//! Removing revisions: depth pruning, explicit purging, and table compaction

use tracing::debug;

use super::node::RevFlags;
use super::RevTree;
use crate::system::metrics::Metrics;

impl RevTree {
    /// Drop ancestors more than `max_depth` generations behind any leaf
    ///
    /// Returns how many nodes were removed. A `max_depth` of 0 disables
    /// pruning, and a tree with no more than `max_depth` nodes is left alone.
    pub fn prune(&mut self, max_depth: u32) -> usize {
        let max_depth = max_depth as usize;
        if max_depth == 0 || self.nodes.len() <= max_depth {
            return 0;
        }

        let mut pruned = 0;
        for leaf in 0..self.nodes.len() {
            if !self.nodes[leaf].is_leaf() {
                if self.sorted {
                    // leaves are all at the front
                    break;
                }
                continue;
            }
            let mut depth = 0;
            let mut cursor = Some(leaf);
            while let Some(index) = cursor {
                depth += 1;
                let node = &mut self.nodes[index];
                if depth > max_depth && !node.is_marked() {
                    node.mark();
                    pruned += 1;
                }
                cursor = node.parent_index();
            }
        }

        if pruned > 0 {
            self.compact();
            Metrics::global().tree.nodes_pruned.inc_by(pruned as u64);
            debug!(pruned, max_depth, remaining = self.nodes.len(), "pruned revision tree");
        }
        pruned
    }

    /// Remove the named revisions
    ///
    /// Only leaves can go. Each pass removes every requested revision that is
    /// currently a leaf; removing a leaf can expose its parent as a new leaf,
    /// so passes repeat while something was removed and some request is still
    /// blocked on a non-leaf. A requested revision whose other children are
    /// not being purged therefore stays. Unknown IDs are ignored.
    pub fn purge(&mut self, rev_ids: &[&[u8]]) -> usize {
        let mut pending: Vec<Option<&[u8]>> = rev_ids.iter().map(|&id| Some(id)).collect();
        let mut purged = 0;

        loop {
            let mut progress = false;
            let mut blocked = false;
            for slot in pending.iter_mut() {
                let Some(index) = slot.and_then(|id| self.index_of(id)) else {
                    continue;
                };
                if !self.nodes[index].is_leaf() {
                    blocked = true;
                    continue;
                }

                self.nodes[index].mark();
                *slot = None;
                purged += 1;
                progress = true;
                if let Some(parent) = self.nodes[index].parent_index() {
                    self.restore_leaf(parent);
                }
            }
            if !(progress && blocked) {
                break;
            }
        }

        if purged > 0 {
            self.compact();
            Metrics::global().tree.nodes_purged.inc_by(purged as u64);
            debug!(purged, remaining = self.nodes.len(), "purged revisions");
        }
        purged
    }

    /// Flag `index` as a leaf again once none of its children survive
    fn restore_leaf(&mut self, index: usize) {
        let has_children = self
            .nodes
            .iter()
            .any(|node| !node.is_marked() && node.parent_index() == Some(index));
        if !has_children && !self.nodes[index].is_leaf() {
            self.nodes[index].flags.insert(RevFlags::LEAF);
            // a fresh leaf is out of canonical position
            self.sorted = false;
        }
    }

    /// Close the gaps left by marked nodes
    ///
    /// Survivors keep their relative order. Parent links are renumbered
    /// through an old-to-new table; a survivor whose parent was removed
    /// becomes a root.
    pub(crate) fn compact(&mut self) {
        let mut remap: Vec<Option<u16>> = Vec::with_capacity(self.nodes.len());
        let mut next: u16 = 0;
        for node in &self.nodes {
            if node.is_marked() {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next = next.wrapping_add(1);
            }
        }

        for node in &mut self.nodes {
            node.parent = node.parent.and_then(|p| remap[p as usize]);
        }
        self.nodes.retain(|node| !node.is_marked());
        self.changed = true;
    }
}
