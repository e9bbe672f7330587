//! Insert with split propagation.

use tracing::debug;

use crate::common::{Error, Rbn, Result};
use crate::index::btree::node::Node;
use crate::index::btree::tree::PathEntry;
use crate::index::btree::BTreeFile;
use crate::record::{Key, Record};
use crate::storage::IndexBlock;

impl BTreeFile {
    /// Insert a record.
    ///
    /// The record is placed in its leaf in key order. An overfilled leaf is
    /// split in two and the split propagates upward through full index
    /// nodes; a split root grows the tree by one level.
    ///
    /// # Errors
    /// - `Error::Capacity` if the record could not fit even in an empty leaf
    /// - `Error::DuplicateKey` if a record with the same key exists
    ///
    /// Both are reported before any block is written.
    pub fn insert(&mut self, record: Record) -> Result<()> {
        self.check_fits(&record)?;

        let key = record.key();
        let (path, mut leaf_node) = self.descend(key)?;
        let leaf = leaf_node.as_leaf_mut()?;
        if leaf.contains(key) {
            return Err(Error::DuplicateKey(key));
        }

        leaf.insert(record);
        let overfilled = leaf.is_overfilled();

        self.begin_mutation()?;
        let applied = if overfilled {
            self.split_leaf(leaf_node, path)
        } else {
            self.write_node(&leaf_node)
        };
        if let Err(e) = applied {
            return Err(self.abort_mutation(e));
        }

        self.header.record_count += 1;
        self.flush()?;
        debug!(key, records = self.header.record_count, "inserted record");
        Ok(())
    }

    /// Split an overfilled leaf and link the new right half into the
    /// sequence set.
    fn split_leaf(&mut self, mut leaf_node: Node, path: Vec<PathEntry>) -> Result<()> {
        let leaf_rbn = leaf_node.rbn();

        // No block is claimed until both halves are known to fit.
        let (separator, mut right) = leaf_node.split(leaf_rbn)?;
        check_halves(&leaf_node, &right)?;

        if leaf_rbn.is_root() {
            let left_rbn = self.allocate()?;
            let right_rbn = self.allocate()?;
            leaf_node.set_rbn(left_rbn);
            right.set_rbn(right_rbn);

            let left_leaf = leaf_node.as_leaf_mut()?;
            left_leaf.set_prev(None);
            left_leaf.set_next(Some(right_rbn));
            let right_leaf = right.as_leaf_mut()?;
            right_leaf.set_prev(Some(left_rbn));
            right_leaf.set_next(None);

            self.write_node(&leaf_node)?;
            self.write_node(&right)?;
            self.grow_root(separator, left_rbn, right_rbn)?;
            self.header.sequence_head = left_rbn;

            debug!(
                left = left_rbn.get(),
                right = right_rbn.get(),
                separator,
                "split root leaf"
            );
            return Ok(());
        }

        let right_rbn = self.allocate()?;
        right.set_rbn(right_rbn);

        let old_next = leaf_node.as_leaf()?.next();
        let right_leaf = right.as_leaf_mut()?;
        right_leaf.set_prev(Some(leaf_rbn));
        right_leaf.set_next(old_next);
        leaf_node.as_leaf_mut()?.set_next(Some(right_rbn));

        if let Some(next_rbn) = old_next {
            let mut neighbour = self.read_node(next_rbn)?;
            neighbour.as_leaf_mut()?.set_prev(Some(right_rbn));
            self.write_node(&neighbour)?;
        }
        self.write_node(&right)?;
        self.write_node(&leaf_node)?;

        debug!(
            leaf = leaf_rbn.get(),
            new = right_rbn.get(),
            separator,
            "split leaf"
        );
        self.insert_into_parent(path, separator, right_rbn)
    }

    /// Add `separator` and the new right sibling `right_rbn` to the parent
    /// at the top of `path`, splitting the parent if it overflows.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<PathEntry>,
        separator: Key,
        right_rbn: Rbn,
    ) -> Result<()> {
        let PathEntry {
            node: mut parent, ..
        } = path
            .pop()
            .ok_or_else(|| Error::invariant("split of a non-root node with no parent"))?;

        parent
            .as_index_mut()?
            .insert_separator(separator, right_rbn, None);

        if !parent.is_overfilled() {
            return self.write_node(&parent);
        }

        let parent_rbn = parent.rbn();
        if parent_rbn.is_root() {
            let left_rbn = self.allocate()?;
            let new_rbn = self.allocate()?;

            let (promoted, right) = parent.split(new_rbn)?;
            parent.set_rbn(left_rbn);
            self.write_node(&parent)?;
            self.write_node(&right)?;
            self.grow_root(promoted, left_rbn, new_rbn)?;

            debug!(
                left = left_rbn.get(),
                right = new_rbn.get(),
                promoted,
                "split root index node"
            );
            return Ok(());
        }

        let new_rbn = self.allocate()?;
        let (promoted, right) = parent.split(new_rbn)?;
        self.write_node(&right)?;
        self.write_node(&parent)?;

        debug!(
            node = parent_rbn.get(),
            new = new_rbn.get(),
            promoted,
            "split index node"
        );
        self.insert_into_parent(path, promoted, new_rbn)
    }

    /// Overwrite RBN 1 with an index node over two children.
    fn grow_root(&mut self, separator: Key, left: Rbn, right: Rbn) -> Result<()> {
        let mut root = IndexBlock::new(self.layout.order);
        root.insert_separator(separator, left, Some(right));
        self.write_node(&Node::index(Rbn::ROOT, root))
    }
}

/// Some sets of uneven records admit no cut where both halves fit in a
/// block. Refuse before anything is allocated or written.
fn check_halves(left: &Node, right: &Node) -> Result<()> {
    if left.is_overfilled() || right.is_overfilled() {
        return Err(Error::invariant(format!(
            "split of {} left a half larger than one block",
            left.rbn()
        )));
    }
    Ok(())
}
