//! Free-block allocation.
//!
//! Two pools: the free list of reclaimed blocks (a LIFO chain threaded
//! through the `next` link of an empty leaf block, headed by `RBN_AVAIL`)
//! and the never-used blocks past `BLOCK_COUNT`. The free list is always
//! drained first.

use tracing::debug;

use crate::common::{Error, Rbn, Result};
use crate::index::btree::node::Node;
use crate::index::btree::BTreeFile;
use crate::storage::LeafBlock;

impl BTreeFile {
    /// Hand out a block for a new node.
    pub(crate) fn allocate(&mut self) -> Result<Rbn> {
        if let Some(rbn) = self.header.free_list_head {
            let node = self.read_node(rbn)?;
            let free = node.as_leaf()?;
            if !free.is_empty() {
                return Err(Error::invariant(format!(
                    "free block {} still holds {} records",
                    rbn,
                    free.len()
                )));
            }
            self.header.free_list_head = free.next();
            debug!(rbn = rbn.get(), "reusing free block");
            return Ok(rbn);
        }

        let rbn = self.header.next_new_rbn();
        self.header.block_count = rbn.get();
        debug!(rbn = rbn.get(), "allocated new block");
        Ok(rbn)
    }

    /// Push a vacated block onto the free list, overwriting it with an
    /// empty leaf whose `next` link is the previous list head.
    pub(crate) fn release(&mut self, rbn: Rbn) -> Result<()> {
        if rbn.is_root() {
            return Err(Error::invariant("the root block cannot be released"));
        }
        let mut free = LeafBlock::new(self.layout);
        free.set_next(self.header.free_list_head);
        self.write_node(&Node::leaf(rbn, free))?;
        self.header.free_list_head = Some(rbn);
        debug!(rbn = rbn.get(), "released block to free list");
        Ok(())
    }

    /// Blocks currently on the free list, head first.
    pub fn free_blocks(&self) -> Result<Vec<Rbn>> {
        let mut blocks = Vec::new();
        let mut cursor = self.header.free_list_head;
        while let Some(rbn) = cursor {
            if blocks.len() as u64 >= u64::from(self.header.block_count) {
                return Err(Error::invariant("free list does not terminate"));
            }
            blocks.push(rbn);
            cursor = self.read_node(rbn)?.as_leaf()?.next();
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use crate::common::{Rbn, TreeConfig};
    use crate::index::btree::BTreeFile;
    use tempfile::tempdir;

    fn create(dir: &tempfile::TempDir) -> BTreeFile {
        let config = TreeConfig::default()
            .with_block_size(256)
            .with_minimum_block_capacity(96)
            .with_order(4)
            .with_sync_on_flush(false);
        BTreeFile::create(dir.path().join("t.dat"), config).unwrap()
    }

    #[test]
    fn test_allocate_bumps_block_count() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);

        assert_eq!(tree.allocate().unwrap(), Rbn::new(2));
        assert_eq!(tree.allocate().unwrap(), Rbn::new(3));
        assert_eq!(tree.header().block_count, 3);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);

        let a = tree.allocate().unwrap();
        let b = tree.allocate().unwrap();
        tree.release(a).unwrap();
        tree.release(b).unwrap();
        assert_eq!(tree.free_blocks().unwrap(), vec![b, a]);

        assert_eq!(tree.allocate().unwrap(), b);
        assert_eq!(tree.allocate().unwrap(), a);
        assert!(tree.free_blocks().unwrap().is_empty());

        // both pools drained in order: free list first, then fresh blocks
        assert_eq!(tree.allocate().unwrap(), Rbn::new(4));
    }

    #[test]
    fn test_release_root_rejected() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);
        assert!(tree.release(Rbn::ROOT).is_err());
    }
}
