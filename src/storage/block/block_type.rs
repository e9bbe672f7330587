//! Block type discriminator.
//!
//! Blocks are text, so the type tag is the first byte of the block:
//! index blocks start with `I`, leaf blocks start with the digits of their
//! record count, and a block that was never written is all zeros.

/// Kind of block stored at an RBN.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Never written (zero-filled or past the end of the file).
    #[default]
    Unwritten,
    /// Sequence-set node holding records.
    Leaf,
    /// Index node holding separators and child RBNs.
    Index,
}

impl BlockKind {
    /// Leading byte that marks an index block.
    pub const INDEX_MARKER: u8 = b'I';

    /// Classify a raw block by its leading byte.
    pub fn detect(raw: &[u8]) -> Self {
        match raw.first() {
            None => BlockKind::Unwritten,
            Some(_) if raw.iter().all(|&b| b == 0) => BlockKind::Unwritten,
            Some(&Self::INDEX_MARKER) => BlockKind::Index,
            Some(_) => BlockKind::Leaf,
        }
    }
}
