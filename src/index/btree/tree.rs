//! Tree driver - file lifecycle, header ownership, and navigation.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::common::config::SOLITARY_LEAF_METADATA_LEN;
use crate::common::{BlockLayout, Error, Rbn, Result, TreeConfig};
use crate::index::btree::node::{Node, NodeKind};
use crate::record::{Key, Record};
use crate::storage::{BlockStore, FileHeader, IoStats, LeafBlock};

/// Deepest descent accepted before the tree is declared cyclic.
pub(crate) const MAX_DEPTH: usize = 64;

/// One step of a root-to-leaf descent: an index node and the slot of the
/// child that was followed.
#[derive(Debug, Clone)]
pub(crate) struct PathEntry {
    pub(crate) node: Node,
    pub(crate) slot: usize,
}

/// A B+ tree stored in one file: an index over a linked sequence set of
/// leaf blocks holding length-indicated records.
///
/// # Architecture
/// ```text
///                 ┌──────────────────────┐
///                 │  RBN 1: INDEX  [k]   │   root, always RBN 1
///                 └───────┬──────┬───────┘
///                         │      │
///            ┌────────────▼┐    ┌▼────────────┐
///            │ RBN 2: LEAF │◀──▶│ RBN 3: LEAF │   sequence set
///            └─────────────┘    └─────────────┘
/// ```
///
/// # Ownership
/// `BTreeFile` is the sole owner of the file handle and of the mutable
/// header fields (record count, block high-water mark, free list head,
/// sequence-set head, staleness). The root node is cached in memory; every
/// other node is read from disk on each traversal.
///
/// # Durability
/// Every mutating operation marks the header stale before its first block
/// write and flushes the header (then `sync_all`, if configured) before it
/// returns.
///
/// # Example
/// ```no_run
/// use seqsetdb::{BTreeFile, Record, TreeConfig};
///
/// let mut tree = BTreeFile::create("zips.dat", TreeConfig::default())?;
/// tree.insert(Record::parse_csv("55414,Minneapolis,MN,Hennepin,44.9,-93.2", 0)?)?;
/// assert_eq!(tree.search(55414)?.field(1), Some("Minneapolis"));
/// tree.close()?;
/// # Ok::<(), seqsetdb::Error>(())
/// ```
pub struct BTreeFile {
    path: PathBuf,
    pub(crate) store: BlockStore,
    pub(crate) header: FileHeader,
    pub(crate) layout: BlockLayout,
    pub(crate) root: Node,
    /// Set once an operation fails after its first write; the header then
    /// stays stale for the rest of the session.
    aborted: bool,
    closed: bool,
}

impl BTreeFile {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a new tree file holding an empty root leaf.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if the configuration is rejected or
    ///   `header_size` cannot hold the header at its widest
    /// - `Error::Io` if the file already exists or cannot be created
    pub fn create<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        config.validate()?;

        let header = FileHeader::new(&config);
        check_header_room(&header)?;

        let layout = header.layout(config.order);
        let store = BlockStore::create(&path, &header, layout, config.sync_on_flush)?;
        let root = Node::leaf(Rbn::ROOT, LeafBlock::new(layout));
        root.write(&store)?;
        store.sync()?;

        info!(
            path = %path.as_ref().display(),
            block_size = layout.block_size,
            order = layout.order,
            "created tree file"
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            store,
            header,
            layout,
            root,
            aborted: false,
            closed: false,
        })
    }

    /// Open an existing tree file.
    ///
    /// Block geometry and the key field come from the file header; `order`
    /// and the sync policy come from `config`.
    ///
    /// # Errors
    /// - `Error::Io` if the file cannot be opened
    /// - `Error::Format` if the header or root block is malformed
    /// - `Error::InvalidConfig` if the stored geometry cannot hold an index
    ///   node of the configured order, or its header room is too small
    pub fn open<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        let (store, header) = BlockStore::open(&path, config.order, config.sync_on_flush)?;

        let effective = TreeConfig {
            block_size: header.block_size,
            minimum_block_capacity: header.minimum_block_capacity,
            header_size: header.header_size,
            record_format: header.record_format.clone(),
            primary_key: header.primary_key,
            ..config.clone()
        };
        if effective != config {
            debug!("file header geometry overrides the supplied configuration");
        }
        effective.validate()?;
        check_header_room(&header)?;

        if header.stale {
            warn!(
                path = %path.as_ref().display(),
                "tree file is marked stale; the previous session did not close cleanly"
            );
        }

        let layout = store.layout();
        let root = Node::read(&store, layout, Rbn::ROOT)?;

        info!(
            path = %path.as_ref().display(),
            records = header.record_count,
            blocks = header.block_count,
            "opened tree file"
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            store,
            header,
            layout,
            root,
            aborted: false,
            closed: false,
        })
    }

    /// Open the file if it exists, otherwise create it.
    pub fn open_or_create<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, config)
        } else {
            Self::create(path, config)
        }
    }

    /// Write a clean header and sync.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        info!(path = %self.path.display(), "closed tree file");
        Ok(())
    }

    /// Rewrite the header with current counts and sync if configured. The
    /// file stays open.
    ///
    /// The stale flag is cleared unless an operation was aborted part way
    /// during this session, in which case it stays set.
    pub fn flush(&mut self) -> Result<()> {
        self.header.stale = self.aborted;
        self.store.write_header(&self.header)?;
        self.store.sync()
    }

    /// Mark the file stale before the first block write of an operation.
    pub(crate) fn begin_mutation(&mut self) -> Result<()> {
        if !self.header.stale {
            self.header.stale = true;
            self.store.write_header(&self.header)?;
        }
        Ok(())
    }

    /// Record that the current operation failed after `begin_mutation`.
    /// The on-disk header keeps `STALE=true` from here on.
    pub(crate) fn abort_mutation(&mut self, error: Error) -> Error {
        self.aborted = true;
        warn!(
            path = %self.path.display(),
            error = %error,
            "operation aborted part way; file left marked stale"
        );
        error
    }

    /// Whether an operation has been aborted during this session.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    // ========================================================================
    // Block access
    // ========================================================================

    /// Load a node; the root is served from memory.
    pub(crate) fn read_node(&self, rbn: Rbn) -> Result<Node> {
        if rbn.is_root() {
            return Ok(self.root.clone());
        }
        Node::read(&self.store, self.layout, rbn)
    }

    /// Write a node, refreshing the cached root when it is RBN 1.
    pub(crate) fn write_node(&mut self, node: &Node) -> Result<()> {
        node.write(&self.store)?;
        if node.rbn().is_root() {
            self.root = node.clone();
        }
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Walk from the root to the leaf responsible for `key`, recording
    /// each index node passed and the child slot taken.
    pub(crate) fn descend(&self, key: Key) -> Result<(Vec<PathEntry>, Node)> {
        let mut path = Vec::new();
        let mut node = self.root.clone();

        loop {
            let (slot, child) = match node.kind() {
                NodeKind::Leaf(_) => return Ok((path, node)),
                NodeKind::Index(index) => {
                    let slot = index.child_index_for(key);
                    let child = index.children().get(slot).copied().ok_or_else(|| {
                        Error::invariant(format!("index node {} has no children", node.rbn()))
                    })?;
                    (slot, child)
                }
            };
            if path.len() >= MAX_DEPTH {
                return Err(Error::invariant(format!(
                    "descent for key {} exceeded {} levels",
                    key, MAX_DEPTH
                )));
            }
            path.push(PathEntry { node, slot });
            node = self.read_node(child)?;
        }
    }

    /// The leaf whose key range covers `key`.
    pub fn find_leaf(&self, key: Key) -> Result<Node> {
        self.descend(key).map(|(_, leaf)| leaf)
    }

    /// Re-traverse from the root to find the index node that holds `child`
    /// among its children. Returns `None` for the root.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` if no index node references it.
    pub fn find_parent(&self, child: &Node) -> Result<Option<Node>> {
        if child.rbn().is_root() {
            return Ok(None);
        }
        let target = child.rbn();

        if let Some(key) = child.largest_key() {
            let mut node = self.root.clone();
            for _ in 0..MAX_DEPTH {
                let next = match node.kind() {
                    NodeKind::Leaf(_) => break,
                    NodeKind::Index(index) => {
                        if index.position_of(target).is_some() {
                            return Ok(Some(node));
                        }
                        index.child_for(key)
                    }
                };
                match next {
                    Some(rbn) => node = self.read_node(rbn)?,
                    None => break,
                }
            }
        }

        // An empty leaf has no routing key; fall back to a full scan.
        let mut pending = vec![self.root.clone()];
        while let Some(node) = pending.pop() {
            if let NodeKind::Index(index) = node.kind() {
                if index.position_of(target).is_some() {
                    return Ok(Some(node));
                }
                for &rbn in index.children() {
                    let child = self.read_node(rbn)?;
                    if !child.is_leaf() {
                        pending.push(child);
                    }
                }
            }
        }

        Err(Error::invariant(format!(
            "{} is not referenced by any index node",
            target
        )))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Find the record with primary key `key`.
    ///
    /// # Errors
    /// Returns `Error::KeyNotFound` if no such record exists.
    pub fn search(&self, key: Key) -> Result<Record> {
        let leaf = self.find_leaf(key)?;
        leaf.as_leaf()?
            .find(key)
            .cloned()
            .ok_or(Error::KeyNotFound(key))
    }

    pub fn contains(&self, key: Key) -> Result<bool> {
        let leaf = self.find_leaf(key)?;
        Ok(leaf.as_leaf()?.contains(key))
    }

    /// Reject a record that cannot be stored even in an otherwise empty
    /// leaf with the longest possible link fields.
    pub(crate) fn check_fits(&self, record: &Record) -> Result<()> {
        record.check_size(self.layout.size_digits)?;
        let solitary = SOLITARY_LEAF_METADATA_LEN + record.encoded_len(self.layout.size_digits);
        if solitary > self.layout.block_size {
            return Err(Error::Capacity {
                size: solitary,
                max: self.layout.block_size,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of live records.
    #[inline]
    pub fn record_count(&self) -> u64 {
        self.header.record_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header.record_count == 0
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    pub fn stats(&self) -> &IoStats {
        self.store.stats()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of index levels above the leaves.
    pub fn height(&self) -> Result<usize> {
        let mut height = 0;
        let mut node = self.root.clone();
        while let Some(first) = node.as_index().ok().and_then(|i| i.children().first().copied()) {
            height += 1;
            if height > MAX_DEPTH {
                return Err(Error::invariant("tree height exceeds the descent limit"));
            }
            node = self.read_node(first)?;
        }
        Ok(height)
    }
}

/// The header must fit `header_size` with every counter at its widest, or
/// a later flush could fail after blocks were already written.
fn check_header_room(header: &FileHeader) -> Result<()> {
    let needed = header.max_encoded_len();
    if needed > header.header_size {
        return Err(Error::InvalidConfig(format!(
            "header size {} cannot hold the header text ({} bytes at most)",
            header.header_size, needed
        )));
    }
    Ok(())
}

impl Drop for BTreeFile {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush tree file on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> TreeConfig {
        TreeConfig::default()
            .with_block_size(256)
            .with_minimum_block_capacity(96)
            .with_order(4)
            .with_sync_on_flush(false)
    }

    #[test]
    fn test_create_new_tree() {
        let dir = tempdir().unwrap();
        let tree = BTreeFile::create(dir.path().join("t.dat"), config()).unwrap();

        assert_eq!(tree.record_count(), 0);
        assert!(tree.is_empty());
        assert!(tree.root.is_leaf());
        assert_eq!(tree.header().block_count, 1);
        assert_eq!(tree.height().unwrap(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        BTreeFile::create(&path, config()).unwrap().close().unwrap();
        assert!(matches!(BTreeFile::create(&path, config()), Err(Error::Io(_))));
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let result = BTreeFile::create(dir.path().join("t.dat"), config().with_order(1));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = BTreeFile::create(dir.path().join("u.dat"), config().with_header_size(64));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_header_size_must_fit_widest_counters() {
        let dir = tempdir().unwrap();

        // enough for a fresh header, not for one with grown counters
        let tight = FileHeader::new(&config()).encoded_len();
        let result = BTreeFile::create(dir.path().join("t.dat"), config().with_header_size(tight));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let exact = FileHeader::new(&config()).max_encoded_len();
        let path = dir.path().join("u.dat");
        let mut tree = BTreeFile::create(&path, config().with_header_size(exact)).unwrap();
        for k in 1..=20 {
            let line = format!("{},Town", k);
            tree.insert(Record::parse_csv(&line, 0).unwrap()).unwrap();
        }
        assert_eq!(tree.record_count(), 20);
        tree.close().unwrap();

        let tree = BTreeFile::open(&path, config()).unwrap();
        assert_eq!(tree.record_count(), 20);
        assert_eq!(tree.header().header_size, exact);
    }

    #[test]
    fn test_open_uses_file_geometry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        BTreeFile::create(&path, config()).unwrap().close().unwrap();

        // default config says 512-byte blocks; the file says 256
        let tree = BTreeFile::open(&path, TreeConfig::default().with_order(4)).unwrap();
        assert_eq!(tree.layout().block_size, 256);
        assert_eq!(tree.layout().minimum_capacity, 96);
        assert!(!tree.header().stale);
    }

    #[test]
    fn test_open_or_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        {
            let mut tree = BTreeFile::open_or_create(&path, config()).unwrap();
            tree.insert(Record::parse_csv("7,Seven", 0).unwrap()).unwrap();
        }

        let tree = BTreeFile::open_or_create(&path, config()).unwrap();
        assert_eq!(tree.record_count(), 1);
        assert_eq!(tree.search(7).unwrap().field(1), Some("Seven"));
    }

    #[test]
    fn test_search_empty_tree() {
        let dir = tempdir().unwrap();
        let tree = BTreeFile::create(dir.path().join("t.dat"), config()).unwrap();
        assert!(matches!(tree.search(1), Err(Error::KeyNotFound(1))));
        assert!(!tree.contains(1).unwrap());
    }

    #[test]
    fn test_find_parent_of_root_is_none() {
        let dir = tempdir().unwrap();
        let tree = BTreeFile::create(dir.path().join("t.dat"), config()).unwrap();
        assert!(tree.find_parent(&tree.root.clone()).unwrap().is_none());
    }

    #[test]
    fn test_check_fits() {
        let dir = tempdir().unwrap();
        let tree = BTreeFile::create(dir.path().join("t.dat"), config()).unwrap();

        let ok = Record::parse_csv("1,short", 0).unwrap();
        assert!(tree.check_fits(&ok).is_ok());

        let long = format!("1,{}", "x".repeat(150));
        let too_long = Record::parse_csv(&long, 0).unwrap();
        assert!(matches!(
            tree.check_fits(&too_long),
            Err(Error::Capacity { .. })
        ));
    }
}
