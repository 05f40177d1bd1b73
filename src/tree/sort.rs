//! Canonical ordering

use std::mem;

use super::RevTree;

impl RevTree {
    /// Put the node table into canonical priority order
    ///
    /// Leaves come first, live revisions before tombstones, and higher
    /// revision IDs before lower ones. Parent links are rewritten through an
    /// old-to-new index table so the tree shape is unchanged.
    pub fn sort(&mut self) {
        if self.sorted {
            return;
        }

        let mut order: Vec<usize> = (0..self.nodes.len()).collect();
        order.sort_by(|&a, &b| self.nodes[a].priority_cmp(&self.nodes[b]));

        let mut old_to_new = vec![0u16; self.nodes.len()];
        for (new, &old) in order.iter().enumerate() {
            old_to_new[old] = new as u16;
        }

        let mut old_nodes = mem::take(&mut self.nodes);
        self.nodes = order
            .iter()
            .map(|&old| {
                let mut node = mem::take(&mut old_nodes[old]);
                node.parent = node.parent.map(|p| old_to_new[p as usize]);
                node
            })
            .collect();

        self.sorted = true;
    }
}
