//! Diagnostic output: hierarchical tree dump and sequence-set listing.

use std::io::Write;

use crate::common::{Error, Result};
use crate::index::btree::node::{Node, NodeKind};
use crate::index::btree::tree::MAX_DEPTH;
use crate::index::btree::BTreeFile;

impl BTreeFile {
    /// Print the tree top-down, one node per line.
    ///
    /// ```text
    /// INDEX NODE: RBN = 1, KEYS = 55408
    /// |-- LEAF NODE: RBN = 2, LARGEST KEY = 55408
    /// |-- LEAF NODE: RBN = 3, LARGEST KEY = 55417
    /// ```
    pub fn dump_tree<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{}", self.root)?;
        self.dump_children(&self.root, out, "", 1)
    }

    fn dump_children<W: Write>(
        &self,
        node: &Node,
        out: &mut W,
        prefix: &str,
        depth: usize,
    ) -> Result<()> {
        let NodeKind::Index(index) = node.kind() else {
            return Ok(());
        };
        if depth > MAX_DEPTH {
            return Err(Error::invariant("tree dump exceeded the descent limit"));
        }

        let last = index.children().len().saturating_sub(1);
        for (i, &rbn) in index.children().iter().enumerate() {
            let child = self.read_node(rbn)?;
            writeln!(out, "{}|-- {}", prefix, child)?;
            let nested = format!("{}{}", prefix, if i < last { "|   " } else { "    " });
            self.dump_children(&child, out, &nested, depth + 1)?;
        }
        Ok(())
    }

    /// Print every leaf in sequence-set order as its block number followed
    /// by its serialized text.
    pub fn display_sequence_set<W: Write>(&self, out: &mut W) -> Result<()> {
        for node in self.leaves() {
            let node = node?;
            writeln!(out, "RELATIVE BLOCK NUMBER: {}", node.rbn().get())?;
            let text = node.as_leaf()?.encode()?;
            out.write_all(&text)?;
            if !text.ends_with(b"\n") {
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::common::TreeConfig;
    use crate::index::btree::BTreeFile;
    use crate::record::Record;
    use tempfile::tempdir;

    fn create(dir: &tempfile::TempDir) -> BTreeFile {
        let config = TreeConfig::default()
            .with_block_size(256)
            .with_minimum_block_capacity(96)
            .with_order(4)
            .with_sync_on_flush(false);
        BTreeFile::create(dir.path().join("t.dat"), config).unwrap()
    }

    fn rec(key: i64) -> Record {
        Record::from_fields([key.to_string(), format!("{:a<26}", "P")], 0).unwrap()
    }

    #[test]
    fn test_dump_single_leaf() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);
        tree.insert(rec(7)).unwrap();

        let mut out = Vec::new();
        tree.dump_tree(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "LEAF NODE: RBN = 1, LARGEST KEY = 7\n"
        );
    }

    #[test]
    fn test_dump_after_root_split() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);
        for k in 10001..=10008 {
            tree.insert(rec(k)).unwrap();
        }

        let mut out = Vec::new();
        tree.dump_tree(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "INDEX NODE: RBN = 1, KEYS = 10004\n\
             |-- LEAF NODE: RBN = 2, LARGEST KEY = 10004\n\
             |-- LEAF NODE: RBN = 3, LARGEST KEY = 10008\n"
        );
    }

    #[test]
    fn test_dump_nested_prefixes() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);
        for k in 10001..=10060 {
            tree.insert(rec(k)).unwrap();
        }

        let mut out = Vec::new();
        tree.dump_tree(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("INDEX NODE: RBN = 1"));
        assert!(text.contains("|   |-- LEAF NODE") || text.contains("    |-- LEAF NODE"));
        assert_eq!(text.matches("LEAF NODE").count(), tree.leaves().count());
    }

    #[test]
    fn test_display_sequence_set() {
        let dir = tempdir().unwrap();
        let mut tree = create(&dir);
        for k in 10001..=10008 {
            tree.insert(rec(k)).unwrap();
        }

        let mut out = Vec::new();
        tree.display_sequence_set(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "RELATIVE BLOCK NUMBER: 2");
        assert!(lines[1].starts_with("4,0,3"));
        assert!(lines[2].starts_with("3310001,"));
        assert_eq!(lines[3], "RELATIVE BLOCK NUMBER: 3");
        assert!(lines[4].starts_with("4,2,0"));
    }
}
