//! Storage layer - file I/O and block formats.
//!
//! This module handles persistent storage:
//! - [`BlockStore`] - header and fixed-size block I/O
//! - [`FileHeader`] - tree-wide metadata at offset 0
//! - [`block`] - leaf and index block codecs
//! - [`IoStats`] - read/write counters

pub mod block;
mod block_store;
mod header;
mod stats;

pub use block::{BlockKind, IndexBlock, LeafBlock};
pub use block_store::BlockStore;
pub use header::FileHeader;
pub use stats::{IoStats, IoStatsSnapshot};
