//! Delete with merge propagation.
//!
//! Merge policy, applied to leaves and index nodes alike:
//! 1. If the previous sibling (same parent) is underfilled, merge into it.
//! 2. Otherwise, if the next sibling (same parent) is underfilled, absorb it.
//! 3. Otherwise keep the underfilled node as it is.
//!
//! An emptied leaf and an index node left without keys always merge with
//! whichever sibling exists. When such an index merge overfills the survivor
//! it is split again into the vacated block.

use tracing::debug;

use crate::common::{Error, Rbn, Result};
use crate::index::btree::node::Node;
use crate::index::btree::tree::PathEntry;
use crate::index::btree::BTreeFile;
use crate::record::{Key, Record};

impl BTreeFile {
    /// Remove and return the record with primary key `key`.
    ///
    /// # Errors
    /// - `Error::KeyNotFound` if no such record exists (nothing is written)
    /// - `Error::InvariantViolation` if a parent lacks the separator or child
    ///   a merge expects
    pub fn remove(&mut self, key: Key) -> Result<Record> {
        let (mut path, mut leaf_node) = self.descend(key)?;
        let leaf = leaf_node.as_leaf_mut()?;
        if !leaf.contains(key) {
            return Err(Error::KeyNotFound(key));
        }

        let removed = leaf.remove_by_key(key)?;
        let underfilled = leaf.is_underfilled();

        self.begin_mutation()?;
        let applied = if leaf_node.rbn().is_root() {
            self.write_node(&leaf_node)
        } else if underfilled {
            self.rebalance_leaf(leaf_node, path)
        } else {
            self.write_node(&leaf_node).and_then(|()| match leaf_node.largest_key() {
                Some(max) => self.propagate_max(&mut path, max),
                None => Ok(()),
            })
        };
        if let Err(e) = applied {
            return Err(self.abort_mutation(e));
        }

        self.header.record_count = self.header.record_count.saturating_sub(1);
        self.flush()?;
        debug!(key, records = self.header.record_count, "removed record");
        Ok(removed)
    }

    /// Remove the stored record with the same key as `record`.
    pub fn remove_record(&mut self, record: &Record) -> Result<Record> {
        self.remove(record.key())
    }

    // ========================================================================
    // Separator maintenance
    // ========================================================================

    /// A child on `path` now has maximum `new_max`. Climb while the child is
    /// the last one of its parent and rewrite the first separator found.
    ///
    /// Path entries are updated in place so later steps see the change.
    fn propagate_max(&mut self, path: &mut [PathEntry], new_max: Key) -> Result<()> {
        for entry in path.iter_mut().rev() {
            let slot = entry.slot;
            let index = entry.node.as_index_mut()?;
            if slot < index.keys().len() {
                if index.set_separator(slot, new_max) {
                    self.write_node(&entry.node)?;
                }
                return Ok(());
            }
        }
        Ok(())
    }

    /// Like [`propagate_max`](Self::propagate_max) but starting at a parent
    /// the caller holds and writes itself.
    fn settle_max(
        &mut self,
        parent: &mut Node,
        slot: usize,
        above: &mut [PathEntry],
        new_max: Key,
    ) -> Result<()> {
        let index = parent.as_index_mut()?;
        if slot < index.keys().len() {
            index.set_separator(slot, new_max);
            Ok(())
        } else {
            self.propagate_max(above, new_max)
        }
    }

    // ========================================================================
    // Leaf level
    // ========================================================================

    fn rebalance_leaf(&mut self, leaf_node: Node, mut path: Vec<PathEntry>) -> Result<()> {
        let entry = path
            .last()
            .ok_or_else(|| Error::invariant("non-root leaf without a parent"))?;
        let slot = entry.slot;
        let children = entry.node.as_index()?.children();
        let leaf = leaf_node.as_leaf()?;
        let force = leaf.is_empty();

        // Only neighbours that share the parent are merge candidates.
        let prev = slot
            .checked_sub(1)
            .and_then(|s| children.get(s).copied())
            .filter(|&rbn| leaf.prev() == Some(rbn));
        let next = children
            .get(slot + 1)
            .copied()
            .filter(|&rbn| leaf.next() == Some(rbn));

        if let Some(prev_rbn) = prev {
            let prev_node = self.read_node(prev_rbn)?;
            if force || prev_node.is_underfilled() {
                return self.merge_leaves(prev_node, leaf_node, slot - 1, path);
            }
        }
        if let Some(next_rbn) = next {
            let next_node = self.read_node(next_rbn)?;
            if force || next_node.is_underfilled() {
                return self.merge_leaves(leaf_node, next_node, slot, path);
            }
        }
        if force {
            return Err(Error::invariant(format!(
                "empty leaf {} has no sibling to merge with",
                leaf_node.rbn()
            )));
        }

        self.write_node(&leaf_node)?;
        match leaf_node.largest_key() {
            Some(max) => self.propagate_max(&mut path, max),
            None => Ok(()),
        }
    }

    /// Merge leaf `right` into its left neighbour `left`; `left_slot` is the
    /// position of `left` in the parent at the top of `path`.
    fn merge_leaves(
        &mut self,
        mut left: Node,
        right: Node,
        left_slot: usize,
        mut path: Vec<PathEntry>,
    ) -> Result<()> {
        let PathEntry {
            node: mut parent, ..
        } = path
            .pop()
            .ok_or_else(|| Error::invariant("leaf merge without a parent"))?;

        let left_rbn = left.rbn();
        let right_rbn = right.rbn();
        let separator = parent.as_index()?.separator_at(left_slot).ok_or_else(|| {
            Error::invariant(format!(
                "parent {} has no separator at slot {}",
                parent.rbn(),
                left_slot
            ))
        })?;
        parent
            .as_index_mut()?
            .remove_separator(separator, right_rbn)?;

        let after = right.as_leaf()?.next();
        left.merge(right, separator)?;
        if let Some(next_rbn) = after {
            let mut neighbour = self.read_node(next_rbn)?;
            neighbour.as_leaf_mut()?.set_prev(Some(left_rbn));
            self.write_node(&neighbour)?;
        }

        if let Some(max) = left.largest_key() {
            self.settle_max(&mut parent, left_slot, &mut path, max)?;
        }
        self.release(right_rbn)?;
        debug!(
            into = left_rbn.get(),
            from = right_rbn.get(),
            "merged leaves"
        );

        if parent.rbn().is_root() {
            if parent.as_index()?.keys().is_empty() {
                return self.collapse_root(left);
            }
            self.write_node(&left)?;
            return self.write_node(&parent);
        }

        self.write_node(&left)?;
        if parent.is_underfilled() {
            self.rebalance_index(parent, path)
        } else {
            self.write_node(&parent)
        }
    }

    // ========================================================================
    // Index level
    // ========================================================================

    fn rebalance_index(&mut self, node: Node, path: Vec<PathEntry>) -> Result<()> {
        let entry = path
            .last()
            .ok_or_else(|| Error::invariant("non-root index node without a parent"))?;
        let slot = entry.slot;
        let children = entry.node.as_index()?.children();
        let prev = slot.checked_sub(1).and_then(|s| children.get(s).copied());
        let next = children.get(slot + 1).copied();
        let force = node.as_index()?.keys().is_empty();

        if let Some(prev_rbn) = prev {
            let prev_node = self.read_node(prev_rbn)?;
            if force || prev_node.is_underfilled() {
                return self.merge_index(prev_node, node, slot - 1, path);
            }
        }
        if let Some(next_rbn) = next {
            let next_node = self.read_node(next_rbn)?;
            if force || next_node.is_underfilled() {
                return self.merge_index(node, next_node, slot, path);
            }
        }
        self.write_node(&node)
    }

    fn merge_index(
        &mut self,
        mut left: Node,
        right: Node,
        left_slot: usize,
        mut path: Vec<PathEntry>,
    ) -> Result<()> {
        let PathEntry { node: mut gp, .. } = path
            .pop()
            .ok_or_else(|| Error::invariant("index merge without a parent"))?;

        let right_rbn = right.rbn();
        let separator = gp.as_index()?.separator_at(left_slot).ok_or_else(|| {
            Error::invariant(format!(
                "index node {} has no separator at slot {}",
                gp.rbn(),
                left_slot
            ))
        })?;
        gp.as_index_mut()?.remove_separator(separator, right_rbn)?;
        left.merge(right, separator)?;

        if left.is_overfilled() {
            // Too many keys for one node: split again into the vacated block.
            let (promoted, new_right) = left.split(right_rbn)?;
            gp.as_index_mut()?
                .insert_separator(promoted, right_rbn, None);
            self.write_node(&new_right)?;
            self.write_node(&left)?;
            debug!(
                left = left.rbn().get(),
                right = right_rbn.get(),
                promoted,
                "redistributed index nodes"
            );
            return self.write_node(&gp);
        }

        self.release(right_rbn)?;
        debug!(
            into = left.rbn().get(),
            from = right_rbn.get(),
            "merged index nodes"
        );

        if gp.rbn().is_root() {
            if gp.as_index()?.keys().is_empty() {
                return self.collapse_root(left);
            }
            self.write_node(&left)?;
            return self.write_node(&gp);
        }

        self.write_node(&left)?;
        if gp.is_underfilled() {
            self.rebalance_index(gp, path)
        } else {
            self.write_node(&gp)
        }
    }

    /// The root index lost its last separator: move its only child into
    /// RBN 1 and free the child's block. Tree height drops by one.
    fn collapse_root(&mut self, child: Node) -> Result<()> {
        let old_rbn = child.rbn();
        let mut root = child;
        root.set_rbn(Rbn::ROOT);
        if let Ok(leaf) = root.as_leaf_mut() {
            leaf.set_prev(None);
            leaf.set_next(None);
            self.header.sequence_head = Rbn::ROOT;
        }
        self.write_node(&root)?;
        self.release(old_rbn)?;
        debug!(from = old_rbn.get(), "collapsed root");
        Ok(())
    }
}
