//! Block formats.
//!
//! Every block in the data region is ASCII text padded to the block size:
//! - [`LeafBlock`] - sequence-set node (records plus prev/next links)
//! - [`IndexBlock`] - separators plus child RBNs
//! - [`BlockKind`] - classifies a raw block by its leading byte

mod block_type;
mod index;
mod leaf;

pub use block_type::BlockKind;
pub use index::IndexBlock;
pub use leaf::LeafBlock;
