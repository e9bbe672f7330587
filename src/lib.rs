//! seqsetdb - a disk-based B+ tree over length-indicated records.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           seqsetdb                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Tree Driver (index/btree/)                  │   │
//! │  │   BTreeFile: search / insert / remove / iter / verify    │   │
//! │  │   split + merge propagation, free-block allocator        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Node facade (index/btree/node)              │   │
//! │  │            Node = Leaf(LeafBlock) | Index(IndexBlock)    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │    Block codecs (storage/block/) + Record codec (record/)│   │
//! │  │   "count,prev,next\n<records>"   "I\n<keys>;<children>\n" │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Storage Layer (storage/)                  │   │
//! │  │        BlockStore + FileHeader + IoStats                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (Rbn, Error, config)
//! - [`record`] - Length-indicated record codec
//! - [`storage`] - File header, block I/O, and block formats
//! - [`index`] - The B+ tree itself
//!
//! # Quick Start
//! ```no_run
//! use seqsetdb::{BTreeFile, Record, TreeConfig};
//!
//! let mut tree = BTreeFile::open_or_create("zips.dat", TreeConfig::default())?;
//! tree.insert(Record::parse_csv("501,Holtsville,NY,Suffolk,40.8,-73.0", 0)?)?;
//!
//! for record in tree.iter() {
//!     println!("{}", record?);
//! }
//! tree.close()?;
//! # Ok::<(), seqsetdb::Error>(())
//! ```

pub mod common;
pub mod index;
pub mod record;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::{BlockLayout, Error, Rbn, Result, TreeConfig};
pub use index::{BTreeFile, Node, NodeKind, SequenceIter, TreeSummary};
pub use record::{Key, Record};
pub use storage::{BlockStore, FileHeader, IndexBlock, IoStats, IoStatsSnapshot, LeafBlock};
