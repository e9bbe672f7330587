//! Index structures.

pub mod btree;

pub use btree::{BTreeFile, Node, NodeKind, SequenceIter, TreeSummary};
