//! B+ tree over a linked sequence set.
//!
//! - [`BTreeFile`] - the tree driver: lifecycle, search, insert, remove
//! - [`Node`] - one block in memory, leaf or index
//! - [`SequenceIter`] / [`LeafIter`] - forward scans along `next` links
//!
//! Diagnostics (`dump_tree`, `display_sequence_set`, `verify`) live in
//! their own modules as further `impl BTreeFile` blocks.

mod allocator;
mod delete;
mod display;
mod insert;
mod iter;
mod node;
mod tree;
mod verify;

pub use iter::{LeafIter, SequenceIter};
pub use node::{Node, NodeKind};
pub use tree::BTreeFile;
pub use verify::TreeSummary;
