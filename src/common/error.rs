//! Error types for seqsetdb.

use thiserror::Error;

use crate::record::Key;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in seqsetdb.
///
/// Overflow and underflow of blocks are *not* errors: they are control
/// signals handled inside the tree driver by splitting and merging.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from seek/read/write or opening the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed header, unrecognized block type, or corrupt length prefix.
    #[error("Format error: {0}")]
    Format(String),

    /// A record (or block payload) does not fit in its serialized slot.
    #[error("Capacity exceeded: {size} bytes (max {max})")]
    Capacity { size: usize, max: usize },

    /// Key absent on search or delete.
    #[error("Key {0} not found")]
    KeyNotFound(Key),

    /// Key already present on insert.
    #[error("Duplicate key {0}")]
    DuplicateKey(Key),

    /// Block was never written (beyond end of file or zero-filled).
    #[error("Block {0} not found")]
    BlockNotFound(u32),

    /// The on-disk structure is inconsistent. Fatal for the current operation.
    #[error("Tree invariant violated: {0}")]
    InvariantViolation(String),

    /// Tree geometry that the algorithms cannot honour.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Shorthand for building a [`Error::Format`].
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Shorthand for building a [`Error::InvariantViolation`].
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// True for the "not found" family (missing key or never-written block).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_) | Error::BlockNotFound(_))
    }
}
