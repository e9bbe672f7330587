//! Forward iteration over the sequence set.

use crate::common::{Error, Rbn, Result};
use crate::index::btree::node::Node;
use crate::index::btree::BTreeFile;
use crate::record::Record;

/// Walks leaf blocks from the leftmost leaf along `next` links.
///
/// Yields each leaf node once. Stops after the first error.
pub struct LeafIter<'a> {
    tree: &'a BTreeFile,
    next: Option<Rbn>,
    visited: u64,
}

impl<'a> LeafIter<'a> {
    pub(crate) fn new(tree: &'a BTreeFile) -> Self {
        Self {
            tree,
            next: Some(tree.header.sequence_head),
            visited: 0,
        }
    }
}

impl Iterator for LeafIter<'_> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        let rbn = self.next.take()?;

        self.visited += 1;
        if self.visited > u64::from(self.tree.header.block_count) {
            return Some(Err(Error::invariant(
                "sequence set is longer than the file; next links form a cycle",
            )));
        }

        let node = match self.tree.read_node(rbn) {
            Ok(node) => node,
            Err(e) => return Some(Err(e)),
        };
        match node.as_leaf() {
            Ok(leaf) => self.next = leaf.next(),
            Err(e) => return Some(Err(e)),
        }
        Some(Ok(node))
    }
}

/// Yields every record in ascending key order.
///
/// # Example
/// ```no_run
/// # use seqsetdb::{BTreeFile, TreeConfig};
/// let tree = BTreeFile::open("zips.dat", TreeConfig::default())?;
/// for record in tree.iter() {
///     println!("{}", record?);
/// }
/// # Ok::<(), seqsetdb::Error>(())
/// ```
pub struct SequenceIter<'a> {
    leaves: LeafIter<'a>,
    buffered: std::vec::IntoIter<Record>,
}

impl Iterator for SequenceIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffered.next() {
                return Some(Ok(record));
            }
            match self.leaves.next()? {
                Ok(node) => match node.into_leaf() {
                    Ok(leaf) => self.buffered = leaf.into_records().into_iter(),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl BTreeFile {
    /// Iterate over all records in key order, starting at the leftmost leaf.
    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            leaves: self.leaves(),
            buffered: Vec::new().into_iter(),
        }
    }

    /// Iterate over the leaf blocks of the sequence set.
    pub fn leaves(&self) -> LeafIter<'_> {
        LeafIter::new(self)
    }
}

impl<'a> IntoIterator for &'a BTreeFile {
    type Item = Result<Record>;
    type IntoIter = SequenceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
