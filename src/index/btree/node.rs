//! Node facade over the two block kinds.

use std::fmt;

use crate::common::{BlockLayout, Error, Rbn, Result};
use crate::record::Key;
use crate::storage::{BlockKind, BlockStore, IndexBlock, LeafBlock};

/// Contents of a node: exactly one of the two block formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Leaf(LeafBlock),
    Index(IndexBlock),
}

/// One block read into memory together with the RBN it lives at.
///
/// Nodes are transient. A node is read, mutated, and written back to the
/// same RBN or to a freshly allocated one; no node keeps a reference to
/// another, parents are tracked by the caller as RBNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    rbn: Rbn,
    kind: NodeKind,
}

impl Node {
    pub fn leaf(rbn: Rbn, leaf: LeafBlock) -> Self {
        Self {
            rbn,
            kind: NodeKind::Leaf(leaf),
        }
    }

    pub fn index(rbn: Rbn, index: IndexBlock) -> Self {
        Self {
            rbn,
            kind: NodeKind::Index(index),
        }
    }

    /// Read block `rbn`, dispatching on its leading type byte.
    ///
    /// # Errors
    /// - `Error::BlockNotFound` for a block that was never written
    /// - `Error::Format` if the block does not decode
    pub fn read(store: &BlockStore, layout: BlockLayout, rbn: Rbn) -> Result<Self> {
        let bytes = store.read_block(rbn)?;
        let kind = match BlockKind::detect(&bytes) {
            BlockKind::Leaf => NodeKind::Leaf(LeafBlock::decode(layout, &bytes)?),
            BlockKind::Index => NodeKind::Index(IndexBlock::decode(layout.order, &bytes)?),
            BlockKind::Unwritten => return Err(Error::BlockNotFound(rbn.get())),
        };
        Ok(Self { rbn, kind })
    }

    /// Write this node at its RBN.
    pub fn write(&self, store: &BlockStore) -> Result<u64> {
        let payload = match &self.kind {
            NodeKind::Leaf(leaf) => leaf.encode()?,
            NodeKind::Index(index) => index.encode(),
        };
        store.write_block(self.rbn, &payload)
    }

    #[inline]
    pub fn rbn(&self) -> Rbn {
        self.rbn
    }

    /// Move the node to another block (the caller writes it there).
    pub fn set_rbn(&mut self, rbn: Rbn) {
        self.rbn = rbn;
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Leaf: largest record key. Index: largest separator.
    pub fn largest_key(&self) -> Option<Key> {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.largest_key(),
            NodeKind::Index(index) => index.largest_key(),
        }
    }

    /// Child to follow for `key`; leaves have none.
    pub fn child_for(&self, key: Key) -> Option<Rbn> {
        match &self.kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Index(index) => index.child_for(key),
        }
    }

    pub fn is_overfilled(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.is_overfilled(),
            NodeKind::Index(index) => index.is_overfilled(),
        }
    }

    pub fn is_underfilled(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.is_underfilled(),
            NodeKind::Index(index) => index.is_underfilled(),
        }
    }

    /// Split the upper half of this node into a new node at `new_rbn`.
    ///
    /// Leaves split by record count, then shift records across the cut
    /// when uneven lengths leave one half over the block size.
    ///
    /// Returns the separator for the parent and the new right node. For a
    /// leaf the separator is the largest key left behind; for an index node
    /// it is the promoted median, which neither half keeps. Sequence-set
    /// links are left to the caller.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` if the node is too small to split.
    pub fn split(&mut self, new_rbn: Rbn) -> Result<(Key, Node)> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => {
                let mut right = LeafBlock::new(leaf.layout());
                leaf.split_into(&mut right);
                leaf.balance_split(&mut right);
                let separator = leaf.largest_key().filter(|_| !right.is_empty()).ok_or_else(|| {
                    Error::invariant(format!("leaf {} has too few records to split", self.rbn))
                })?;
                Ok((separator, Node::leaf(new_rbn, right)))
            }
            NodeKind::Index(index) => {
                if index.keys().len() < 2 {
                    return Err(Error::invariant(format!(
                        "index {} has too few keys to split",
                        self.rbn
                    )));
                }
                let mid = index.keys().len() / 2;
                let (separator, right) = index.split_at(mid);
                Ok((separator, Node::index(new_rbn, right)))
            }
        }
    }

    /// Absorb `other`, the right-hand neighbour of this node.
    ///
    /// `separator` is the parent's key between the two nodes; index merges
    /// pull it down between the key lists, leaf merges ignore it.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` if the kinds differ.
    pub fn merge(&mut self, other: Node, separator: Key) -> Result<()> {
        match (&mut self.kind, other.kind) {
            (NodeKind::Leaf(left), NodeKind::Leaf(mut right)) => {
                left.merge_from(&mut right);
                left.set_next(right.next());
                Ok(())
            }
            (NodeKind::Index(left), NodeKind::Index(right)) => {
                left.merge_from(separator, right);
                Ok(())
            }
            _ => Err(Error::invariant(format!(
                "cannot merge {} with {}: block kinds differ",
                self.rbn, other.rbn
            ))),
        }
    }

    // ========================================================================
    // Typed access
    // ========================================================================

    pub fn as_leaf(&self) -> Result<&LeafBlock> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Index(_) => Err(self.expected("leaf")),
        }
    }

    pub fn as_leaf_mut(&mut self) -> Result<&mut LeafBlock> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Index(_) => Err(Error::invariant(format!("{} is not a leaf", self.rbn))),
        }
    }

    pub fn as_index(&self) -> Result<&IndexBlock> {
        match &self.kind {
            NodeKind::Index(index) => Ok(index),
            NodeKind::Leaf(_) => Err(self.expected("index node")),
        }
    }

    pub fn as_index_mut(&mut self) -> Result<&mut IndexBlock> {
        match &mut self.kind {
            NodeKind::Index(index) => Ok(index),
            NodeKind::Leaf(_) => Err(Error::invariant(format!(
                "{} is not an index node",
                self.rbn
            ))),
        }
    }

    pub fn into_leaf(self) -> Result<LeafBlock> {
        match self.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Index(_) => Err(Error::invariant(format!("{} is not a leaf", self.rbn))),
        }
    }

    fn expected(&self, what: &str) -> Error {
        Error::invariant(format!("{} is not a {}", self.rbn, what))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Leaf(leaf) => {
                write!(f, "LEAF NODE: RBN = {}, LARGEST KEY = ", self.rbn.get())?;
                match leaf.largest_key() {
                    Some(key) => write!(f, "{}", key),
                    None => write!(f, "none"),
                }
            }
            NodeKind::Index(index) => {
                write!(f, "INDEX NODE: RBN = {}, KEYS =", self.rbn.get())?;
                for key in index.keys() {
                    write!(f, " {}", key)?;
                }
                Ok(())
            }
        }
    }
}
