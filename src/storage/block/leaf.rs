//! Leaf block codec - one node of the sequence set.
//!
//! # Layout
//! ```text
//! <recordCount>,<prevRBN>,<nextRBN>\n<record><record>...
//! ```
//! Records are length-indicated (see [`crate::record`]) and kept in
//! ascending key order after every insert. The block store pads the encoded
//! bytes with spaces and a trailing newline up to the block size.

use crate::common::config::leaf_metadata_reserve;
use crate::common::{BlockLayout, Error, Rbn, Result};
use crate::record::{Key, Record};

use super::BlockKind;

/// A sequence-set node: records plus links to its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafBlock {
    prev: Option<Rbn>,
    next: Option<Rbn>,
    records: Vec<Record>,
    layout: BlockLayout,
}

impl LeafBlock {
    /// Create an empty, unlinked leaf.
    pub fn new(layout: BlockLayout) -> Self {
        Self {
            prev: None,
            next: None,
            records: Vec::new(),
            layout,
        }
    }

    /// Parse a leaf from block bytes (padding may already be trimmed).
    ///
    /// # Errors
    /// - `Error::Format` if the block carries the index marker, the metadata
    ///   line is malformed, or a record is corrupt
    pub fn decode(layout: BlockLayout, bytes: &[u8]) -> Result<Self> {
        match BlockKind::detect(bytes) {
            BlockKind::Leaf => {}
            kind => {
                return Err(Error::format(format!(
                    "expected leaf block, found {:?}",
                    kind
                )))
            }
        }

        let split = bytes.iter().position(|&b| b == b'\n');
        let (meta, mut rest) = match split {
            Some(pos) => (&bytes[..pos], &bytes[pos + 1..]),
            None => (bytes, &bytes[bytes.len()..]),
        };

        let meta = std::str::from_utf8(meta)
            .map_err(|_| Error::format("leaf metadata is not valid UTF-8"))?;
        let parts: Vec<&str> = meta.split(',').collect();
        if parts.len() != 3 {
            return Err(Error::format(format!("malformed leaf metadata {:?}", meta)));
        }
        let count: usize = parse_field(parts[0], "record count")?;
        let prev: u32 = parse_field(parts[1], "prev RBN")?;
        let next: u32 = parse_field(parts[2], "next RBN")?;

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let (record, used) = Record::decode(rest, layout.size_digits, layout.key_field)?;
            records.push(record);
            rest = &rest[used..];
        }
        if !rest.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::format(format!(
                "{} trailing bytes after {} records",
                rest.len(),
                count
            )));
        }

        Ok(Self {
            prev: Rbn::from_raw(prev),
            next: Rbn::from_raw(next),
            records,
            layout,
        })
    }

    /// Serialize metadata and records (unpadded).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = self.metadata().into_bytes();
        for record in &self.records {
            record.encode_into(&mut out, self.layout.size_digits)?;
        }
        Ok(out)
    }

    fn metadata(&self) -> String {
        format!(
            "{},{},{}\n",
            self.records.len(),
            Rbn::to_raw(self.prev),
            Rbn::to_raw(self.next)
        )
    }

    /// Serialized byte length with the current links.
    pub fn encoded_len(&self) -> usize {
        self.metadata().len() + self.records_len()
    }

    /// Byte length the fill checks use: the records plus the metadata line
    /// at its widest. Never less than [`encoded_len`](Self::encoded_len).
    pub fn fill_len(&self) -> usize {
        leaf_metadata_reserve(self.records.len()) + self.records_len()
    }

    fn records_len(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.encoded_len(self.layout.size_digits))
            .sum()
    }

    // ========================================================================
    // Record-level operations
    // ========================================================================

    /// Append one record without reordering.
    pub fn pack(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Pop the next record in storage order, or `None` when empty.
    pub fn unpack(&mut self) -> Option<Record> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.records.remove(0))
        }
    }

    /// Restore ascending key order.
    pub fn sort(&mut self) {
        self.records.sort_by_key(Record::key);
    }

    /// Pack then sort. The caller checks [`is_overfilled`](Self::is_overfilled).
    pub fn insert(&mut self, record: Record) {
        self.pack(record);
        self.sort();
    }

    /// Remove the record with `key`.
    ///
    /// # Errors
    /// Returns `Error::KeyNotFound` if no record has that key.
    pub fn remove_by_key(&mut self, key: Key) -> Result<Record> {
        let pos = self
            .records
            .iter()
            .position(|r| r.key() == key)
            .ok_or(Error::KeyNotFound(key))?;
        Ok(self.records.remove(pos))
    }

    /// Linear scan for an exact key.
    pub fn find(&self, key: Key) -> Option<&Record> {
        self.records.iter().find(|r| r.key() == key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.find(key).is_some()
    }

    /// Largest key held, or `None` if empty.
    pub fn largest_key(&self) -> Option<Key> {
        self.records.iter().map(Record::key).max()
    }

    // ========================================================================
    // Fill state
    // ========================================================================

    pub fn is_overfilled(&self) -> bool {
        self.fill_len() > self.layout.block_size
    }

    pub fn is_underfilled(&self) -> bool {
        self.fill_len() < self.layout.minimum_capacity
    }

    /// Whether `record` could be added without overfilling this block.
    fn has_room_for(&self, record: &Record) -> bool {
        leaf_metadata_reserve(self.records.len() + 1)
            + self.records_len()
            + record.encoded_len(self.layout.size_digits)
            <= self.layout.block_size
    }

    // ========================================================================
    // Restructuring
    // ========================================================================

    /// Move the upper `count / 2` records into `other`, keeping order.
    pub fn split_into(&mut self, other: &mut LeafBlock) {
        let keep = self.records.len() - self.records.len() / 2;
        other.records.extend(self.records.drain(keep..));
    }

    /// Shift records across the boundary left by
    /// [`split_into`](Self::split_into) until both halves fit, where the
    /// record lengths allow it. Each half keeps at least one record.
    pub fn balance_split(&mut self, right: &mut LeafBlock) {
        while self.is_overfilled() && self.records.len() > 1 {
            if let Some(record) = self.records.pop() {
                right.records.insert(0, record);
            }
        }
        while right.is_overfilled()
            && right.records.len() > 1
            && self.has_room_for(&right.records[0])
        {
            let record = right.records.remove(0);
            self.records.push(record);
        }
    }

    /// Append every record of `other` (which ends up empty).
    pub fn merge_from(&mut self, other: &mut LeafBlock) {
        self.records.append(&mut other.records);
    }

    /// Pull records from the front of the right sibling `other` until this
    /// block is no longer underfilled or `other` runs dry.
    ///
    /// Returns the number of records moved.
    pub fn redistribute_from(&mut self, other: &mut LeafBlock) -> usize {
        let mut moved = 0;
        while self.is_underfilled() {
            match other.unpack() {
                Some(record) => {
                    self.pack(record);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn prev(&self) -> Option<Rbn> {
        self.prev
    }

    #[inline]
    pub fn set_prev(&mut self, rbn: Option<Rbn>) {
        self.prev = rbn;
    }

    #[inline]
    pub fn next(&self) -> Option<Rbn> {
        self.next
    }

    #[inline]
    pub fn set_next(&mut self, rbn: Option<Rbn>) {
        self.next = rbn;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::format(format!("invalid {} {:?} in leaf metadata", what, raw)))
}
