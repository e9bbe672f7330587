//! Block I/O statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the block store.
///
/// All fields are atomic so read-only tree operations holding `&self` can
/// still count their reads. `Ordering::Relaxed` is enough: each counter is
/// independent and only ever read as an approximate total.
///
/// # Example
/// ```
/// use seqsetdb::IoStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = IoStats::new();
/// stats.blocks_read.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().blocks_read, 1);
/// ```
#[derive(Debug)]
pub struct IoStats {
    /// Blocks read from disk.
    pub blocks_read: AtomicU64,

    /// Blocks written to disk.
    pub blocks_written: AtomicU64,

    /// Header rewrites.
    pub header_writes: AtomicU64,

    /// `sync_all` calls.
    pub syncs: AtomicU64,
}

impl IoStats {
    pub fn new() -> Self {
        Self {
            blocks_read: AtomicU64::new(0),
            blocks_written: AtomicU64::new(0),
            header_writes: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_read(&self) {
        self.blocks_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_header_write(&self) {
        self.header_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-atomic copy for display and comparison.
    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            header_writes: self.header_writes.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.blocks_read.store(0, Ordering::Relaxed);
        self.blocks_written.store(0, Ordering::Relaxed);
        self.header_writes.store(0, Ordering::Relaxed);
        self.syncs.store(0, Ordering::Relaxed);
    }
}

impl Default for IoStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`IoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStatsSnapshot {
    pub blocks_read: u64,
    pub blocks_written: u64,
    pub header_writes: u64,
    pub syncs: u64,
}

impl IoStatsSnapshot {
    /// Block reads plus block writes.
    pub fn block_io(&self) -> u64 {
        self.blocks_read + self.blocks_written
    }
}

impl fmt::Display for IoStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IoStats {{ reads: {}, writes: {}, header_writes: {}, syncs: {} }}",
            self.blocks_read, self.blocks_written, self.header_writes, self.syncs
        )
    }
}
