//! Block store - low-level file I/O for the header and fixed-size blocks.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{BlockLayout, Error, Rbn, Result};
use crate::storage::{FileHeader, IoStats};

/// Owns the file handle of one tree file.
///
/// # File Layout
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┬─────────┐
/// │  Header  │  RBN 1  │  RBN 2  │  ...    │  RBN N  │
/// │  (text)  │ (root)  │         │         │         │
/// └──────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0    H       H+B       ...   H+(N-1)×B
/// ```
///
/// Block `n` is located at `header_size + (n - 1) × block_size`. Blocks are
/// text padded with spaces and a final newline to exactly `block_size`.
///
/// # Thread Safety
/// The file sits behind a `Mutex` so that every seek-then-read/write pair is
/// atomic and read paths can take `&self`.
pub struct BlockStore {
    file: Mutex<File>,
    layout: BlockLayout,
    sync_on_flush: bool,
    stats: IoStats,
}

impl BlockStore {
    /// Create a new tree file and write `header` at offset 0.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: &FileHeader,
        layout: BlockLayout,
        sync_on_flush: bool,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let store = Self {
            file: Mutex::new(file),
            layout,
            sync_on_flush,
            stats: IoStats::new(),
        };
        store.write_header(header)?;
        Ok(store)
    }

    /// Open an existing tree file and parse its header.
    ///
    /// The returned layout takes its sizes from the header; only `order`
    /// comes from the caller.
    ///
    /// # Errors
    /// - `Error::Io` if the file doesn't exist or cannot be opened
    /// - `Error::Format` if the header is malformed
    pub fn open<P: AsRef<Path>>(
        path: P,
        order: usize,
        sync_on_flush: bool,
    ) -> Result<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let header = FileHeader::read_from(&mut file)?;

        let store = Self {
            file: Mutex::new(file),
            layout: header.layout(order),
            sync_on_flush,
            stats: IoStats::new(),
        };
        Ok((store, header))
    }

    /// Re-read the header from disk.
    pub fn read_header(&self) -> Result<FileHeader> {
        let mut file = self.file.lock();
        FileHeader::read_from(&mut *file)
    }

    /// Rewrite the header at offset 0.
    pub fn write_header(&self, header: &FileHeader) -> Result<()> {
        let mut file = self.file.lock();
        header.write_to(&mut *file)?;
        self.stats.record_header_write();
        trace!(stale = header.stale, records = header.record_count, "header written");
        Ok(())
    }

    /// Read block `rbn` with its padding trimmed.
    ///
    /// # Errors
    /// Returns `Error::BlockNotFound` if the block lies past the end of the
    /// file or was never written (all zeros).
    pub fn read_block(&self, rbn: Rbn) -> Result<Vec<u8>> {
        let offset = self.layout.offset_of(rbn);
        let mut buf = vec![0u8; self.layout.block_size];

        {
            let mut file = self.file.lock();
            let len = file.metadata()?.len();
            if offset + self.layout.block_size as u64 > len {
                return Err(Error::BlockNotFound(rbn.get()));
            }
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
        }
        self.stats.record_read();

        if buf.iter().all(|&b| b == 0) {
            return Err(Error::BlockNotFound(rbn.get()));
        }

        let end = buf
            .iter()
            .rposition(|&b| b != b' ' && b != b'\n')
            .map_or(0, |pos| pos + 1);
        buf.truncate(end);

        trace!(rbn = rbn.get(), bytes = end, "block read");
        Ok(buf)
    }

    /// Pad `payload` to the block size and write it at block `rbn`.
    ///
    /// Returns the absolute offset written, from which the RBN can be
    /// recovered with [`BlockLayout::rbn_at`].
    ///
    /// # Errors
    /// - `Error::Capacity` if the payload is longer than a block
    /// - `Error::Io` if the write fails
    pub fn write_block(&self, rbn: Rbn, payload: &[u8]) -> Result<u64> {
        let block_size = self.layout.block_size;
        if payload.len() > block_size {
            return Err(Error::Capacity {
                size: payload.len(),
                max: block_size,
            });
        }

        let mut buf = Vec::with_capacity(block_size);
        buf.extend_from_slice(payload);
        if buf.len() < block_size {
            buf.resize(block_size - 1, b' ');
            buf.push(b'\n');
        }

        let offset = self.layout.offset_of(rbn);
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&buf)?;
        }
        self.stats.record_write();

        trace!(rbn = rbn.get(), bytes = payload.len(), "block written");
        Ok(offset)
    }

    /// Flush file contents to stable storage if the store was opened with
    /// `sync_on_flush`.
    pub fn sync(&self) -> Result<()> {
        if !self.sync_on_flush {
            return Ok(());
        }
        self.file.lock().sync_all()?;
        self.stats.record_sync();
        Ok(())
    }

    #[inline]
    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    #[inline]
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// Current length of the file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}
