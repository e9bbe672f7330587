//! Structural verification of a tree file.
//!
//! Re-reads every reachable block and checks:
//! - separator `i` equals the maximum key under child `i`
//! - keys fall inside the range their ancestors route to them
//! - all leaves sit at the same depth
//! - the sequence set visits exactly the leaves of the tree, in order, with
//!   consistent `prev` links, starting at the recorded head
//! - no non-root node is empty or over capacity
//! - the header's record count matches the records found
//! - no free block is also reachable from the root

use std::collections::HashSet;

use crate::common::{Error, Rbn, Result};
use crate::index::btree::node::{Node, NodeKind};
use crate::index::btree::tree::MAX_DEPTH;
use crate::index::btree::BTreeFile;
use crate::record::Key;

/// Totals gathered while verifying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub records: u64,
    pub leaves: usize,
    pub index_nodes: usize,
    /// Index levels above the leaves.
    pub height: usize,
    pub free_blocks: usize,
}

#[derive(Default)]
struct Walk {
    seen: HashSet<Rbn>,
    leaves: Vec<Rbn>,
    leaf_depth: Option<usize>,
    summary: TreeSummary,
}

impl BTreeFile {
    /// Check every structural property of the file.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` describing the first breach, or
    /// the read error that stopped the walk.
    pub fn verify(&self) -> Result<TreeSummary> {
        let mut walk = Walk::default();
        self.check_node(&self.root, None, None, 0, &mut walk)?;

        self.check_sequence_set(&walk.leaves)?;

        if walk.summary.records != self.header.record_count {
            return Err(Error::invariant(format!(
                "header counts {} records, tree holds {}",
                self.header.record_count, walk.summary.records
            )));
        }

        let free = self.free_blocks()?;
        if let Some(rbn) = free.iter().find(|rbn| walk.seen.contains(rbn)) {
            return Err(Error::invariant(format!(
                "{} is on the free list but reachable from the root",
                rbn
            )));
        }

        let mut summary = walk.summary;
        summary.leaves = walk.leaves.len();
        summary.height = walk.leaf_depth.unwrap_or(0);
        summary.free_blocks = free.len();
        Ok(summary)
    }

    /// Verify the subtree at `node`, whose keys must lie in
    /// `(lower, upper]`. Returns the subtree's largest key.
    fn check_node(
        &self,
        node: &Node,
        lower: Option<Key>,
        upper: Option<Key>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<Option<Key>> {
        let rbn = node.rbn();
        if depth > MAX_DEPTH || !walk.seen.insert(rbn) {
            return Err(Error::invariant(format!("{} is reachable twice", rbn)));
        }
        let is_root = rbn.is_root();

        match node.kind() {
            NodeKind::Leaf(leaf) => {
                if !is_root && leaf.is_empty() {
                    return Err(Error::invariant(format!("non-root leaf {} is empty", rbn)));
                }
                if leaf.is_overfilled() {
                    return Err(Error::invariant(format!("leaf {} exceeds the block size", rbn)));
                }
                let keys: Vec<Key> = leaf.records().iter().map(|r| r.key()).collect();
                if keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::invariant(format!("leaf {} is not sorted", rbn)));
                }
                check_bounds(rbn, &keys, lower, upper)?;

                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(Error::invariant(format!(
                            "leaf {} at depth {}, expected {}",
                            rbn, depth, d
                        )));
                    }
                    Some(_) => {}
                }
                walk.leaves.push(rbn);
                walk.summary.records += keys.len() as u64;
                Ok(leaf.largest_key())
            }
            NodeKind::Index(index) => {
                let keys = index.keys();
                if keys.is_empty() {
                    return Err(Error::invariant(format!("index node {} has no keys", rbn)));
                }
                if index.is_overfilled() {
                    return Err(Error::invariant(format!(
                        "index node {} holds {} keys, order is {}",
                        rbn,
                        keys.len(),
                        index.order()
                    )));
                }
                if keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::invariant(format!("index node {} is not sorted", rbn)));
                }
                check_bounds(rbn, keys, lower, upper)?;
                walk.summary.index_nodes += 1;

                let mut max = None;
                for (i, &child_rbn) in index.children().iter().enumerate() {
                    if child_rbn.is_root() {
                        return Err(Error::invariant(format!("{} points back at the root", rbn)));
                    }
                    let child_lower = if i == 0 { lower } else { Some(keys[i - 1]) };
                    let child_upper = keys.get(i).copied().or(upper);
                    let child = self.read_node(child_rbn)?;
                    max = self.check_node(&child, child_lower, child_upper, depth + 1, walk)?;

                    if let Some(&separator) = keys.get(i) {
                        if max != Some(separator) {
                            return Err(Error::invariant(format!(
                                "separator {} in {} but child {} has maximum {:?}",
                                separator, rbn, child_rbn, max
                            )));
                        }
                    }
                }
                Ok(max)
            }
        }
    }

    fn check_sequence_set(&self, tree_order: &[Rbn]) -> Result<()> {
        if tree_order.first() != Some(&self.header.sequence_head) {
            return Err(Error::invariant(format!(
                "sequence head is {} but the leftmost leaf is {:?}",
                self.header.sequence_head,
                tree_order.first()
            )));
        }

        let mut prev: Option<Rbn> = None;
        for (i, node) in self.leaves().enumerate() {
            let node = node?;
            if tree_order.get(i) != Some(&node.rbn()) {
                return Err(Error::invariant(format!(
                    "sequence set visits {} where the tree has {:?}",
                    node.rbn(),
                    tree_order.get(i)
                )));
            }
            if node.as_leaf()?.prev() != prev {
                return Err(Error::invariant(format!(
                    "leaf {} has prev {:?}, expected {:?}",
                    node.rbn(),
                    node.as_leaf()?.prev(),
                    prev
                )));
            }
            prev = Some(node.rbn());
        }

        if prev != tree_order.last().copied() {
            return Err(Error::invariant("sequence set ends before the last leaf"));
        }
        Ok(())
    }
}

fn check_bounds(rbn: Rbn, keys: &[Key], lower: Option<Key>, upper: Option<Key>) -> Result<()> {
    let (Some(&first), Some(&last)) = (keys.first(), keys.last()) else {
        return Ok(());
    };
    if lower.is_some_and(|l| first <= l) || upper.is_some_and(|u| last > u) {
        return Err(Error::invariant(format!(
            "{} holds keys {}..={} outside ({:?}, {:?}]",
            rbn, first, last, lower, upper
        )));
    }
    Ok(())
}
