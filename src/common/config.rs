//! Configuration for seqsetdb tree files.
//!
//! Two layers:
//! - Compile-time defaults (the `DEFAULT_*` constants below)
//! - [`TreeConfig`], the runtime knobs a caller passes to `create`/`open`
//!
//! Everything the engine needs at runtime is folded into one [`BlockLayout`]
//! value that is threaded explicitly through the codecs and the tree driver.

use crate::common::{Error, Result};

/// Default size of one block in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default minimum filled-byte threshold for a leaf.
pub const DEFAULT_MINIMUM_BLOCK_CAPACITY: usize = 256;

/// Default size of the text header at offset 0.
pub const DEFAULT_HEADER_SIZE: usize = 512;

/// Default maximum number of keys in an index node.
pub const DEFAULT_ORDER: usize = 10;

/// Number of ASCII digits in a record's length prefix.
pub const RECORD_SIZE_DIGITS: usize = 2;

/// `FILE_TYPE` written into the header of a tree file.
pub const FILE_TYPE: &str = "blocked sequence set with index";

/// `VERSION` written into the header of a tree file.
pub const FORMAT_VERSION: &str = "2.0";

/// Default record schema (six comma-separated fields, key first).
pub const DEFAULT_RECORD_FORMAT: &str = "ZipCode,PlaceName,State,County,Lat,Long";

/// Smallest order the split/merge arithmetic supports.
pub const MIN_ORDER: usize = 3;

/// Longest decimal rendering of a key (`i64::MIN`).
const KEY_MAX_DIGITS: usize = 20;

/// Longest decimal rendering of an RBN (`u32::MAX`).
const RBN_MAX_DIGITS: usize = 10;

/// Number of decimal digits in `n`.
const fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Bytes reserved for the metadata line `"<count>,<prev>,<next>\n"` of a
/// leaf holding `count` records, with both links at `u32::MAX` width.
///
/// Leaf fill checks measure against this reserve, so rewriting a leaf's
/// links never changes whether it fits in a block.
#[inline]
pub const fn leaf_metadata_reserve(count: usize) -> usize {
    decimal_digits(count) + 1 + RBN_MAX_DIGITS + 1 + RBN_MAX_DIGITS + 1
}

/// Metadata reserve of a leaf holding exactly one record. A record that
/// does not fit beside it cannot be stored at all.
pub const SOLITARY_LEAF_METADATA_LEN: usize = leaf_metadata_reserve(1);

/// Largest record body a length prefix of `digits` digits can describe.
#[inline]
pub const fn max_record_body(digits: usize) -> usize {
    10usize.pow(digits as u32) - 1
}

/// Worst-case serialized size of an index block holding `order` keys.
#[inline]
pub const fn index_payload_max(order: usize) -> usize {
    // "I\n" + keys + ";" + children + "\n"
    2 + order * (KEY_MAX_DIGITS + 1) + (order + 1) * (RBN_MAX_DIGITS + 1) + 1
}

/// Runtime configuration for creating or opening a tree file.
///
/// # Example
/// ```
/// use seqsetdb::TreeConfig;
///
/// let config = TreeConfig::default()
///     .with_block_size(256)
///     .with_minimum_block_capacity(96)
///     .with_order(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Size of each block in bytes.
    pub block_size: usize,
    /// Minimum serialized bytes before a leaf counts as underfilled.
    pub minimum_block_capacity: usize,
    /// Size of the text header at offset 0.
    pub header_size: usize,
    /// Maximum keys per index node.
    pub order: usize,
    /// Comma-separated field names of a record.
    pub record_format: String,
    /// 1-based index of the primary key field.
    pub primary_key: usize,
    /// Call `sync_all` after every mutating operation.
    pub sync_on_flush: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            minimum_block_capacity: DEFAULT_MINIMUM_BLOCK_CAPACITY,
            header_size: DEFAULT_HEADER_SIZE,
            order: DEFAULT_ORDER,
            record_format: DEFAULT_RECORD_FORMAT.to_string(),
            primary_key: 1,
            sync_on_flush: true,
        }
    }
}

impl TreeConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_minimum_block_capacity(mut self, capacity: usize) -> Self {
        self.minimum_block_capacity = capacity;
        self
    }

    pub fn with_header_size(mut self, header_size: usize) -> Self {
        self.header_size = header_size;
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_record_format(mut self, format: impl Into<String>, primary_key: usize) -> Self {
        self.record_format = format.into();
        self.primary_key = primary_key;
        self
    }

    pub fn with_sync_on_flush(mut self, sync: bool) -> Self {
        self.sync_on_flush = sync;
        self
    }

    /// Number of fields described by `record_format`.
    pub fn field_count(&self) -> usize {
        self.record_format.split(',').count()
    }

    /// Check that the geometry is one the split/merge algorithms can honour.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.order < MIN_ORDER {
            return Err(Error::InvalidConfig(format!(
                "order {} is below the minimum of {}",
                self.order, MIN_ORDER
            )));
        }
        if self.minimum_block_capacity == 0 {
            return Err(Error::InvalidConfig(
                "minimum block capacity must be positive".to_string(),
            ));
        }
        // Two underfilled leaves must always merge into one block.
        if self.minimum_block_capacity > self.block_size / 2 {
            return Err(Error::InvalidConfig(format!(
                "minimum block capacity {} exceeds half the block size {}",
                self.minimum_block_capacity, self.block_size
            )));
        }
        let smallest_leaf = SOLITARY_LEAF_METADATA_LEN + RECORD_SIZE_DIGITS + 2;
        if self.block_size < smallest_leaf {
            return Err(Error::InvalidConfig(format!(
                "block size {} cannot hold a single record (need {})",
                self.block_size, smallest_leaf
            )));
        }
        if index_payload_max(self.order) > self.block_size {
            return Err(Error::InvalidConfig(format!(
                "block size {} cannot hold an index node of order {} (need {})",
                self.block_size,
                self.order,
                index_payload_max(self.order)
            )));
        }
        if self.primary_key == 0 || self.primary_key > self.field_count() {
            return Err(Error::InvalidConfig(format!(
                "primary key field {} is outside 1..={}",
                self.primary_key,
                self.field_count()
            )));
        }
        Ok(())
    }
}

/// Resolved geometry of an open tree file.
///
/// Built from the file header (sizes, key field) plus the caller's
/// [`TreeConfig`] (order). Cheap to copy; every codec receives one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Byte offset where block data begins.
    pub header_size: u64,
    pub block_size: usize,
    pub minimum_capacity: usize,
    pub order: usize,
    /// 0-based index of the key field inside a record.
    pub key_field: usize,
    pub size_digits: usize,
}

impl BlockLayout {
    /// Absolute file offset of block `rbn`.
    #[inline]
    pub fn offset_of(&self, rbn: crate::common::Rbn) -> u64 {
        self.header_size + (rbn.get() as u64 - 1) * self.block_size as u64
    }

    /// Recover the RBN from an absolute offset returned by a block write.
    #[inline]
    pub fn rbn_at(&self, offset: u64) -> Option<crate::common::Rbn> {
        if offset < self.header_size {
            return None;
        }
        let n = (offset - self.header_size) / self.block_size as u64 + 1;
        u32::try_from(n).ok().and_then(crate::common::Rbn::from_raw)
    }

    /// Minimum keys a non-root index node should hold.
    #[inline]
    pub fn min_keys(&self) -> usize {
        self.order / 2
    }

    /// Largest record body the length prefix can express.
    #[inline]
    pub fn max_record_body(&self) -> usize {
        max_record_body(self.size_digits)
    }
}
