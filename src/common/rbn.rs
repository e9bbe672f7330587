//! Relative block number type.

use std::fmt;

/// Identifies a block in the data region of a tree file.
///
/// RBNs are 1-based: block `n` starts at `header_size + (n - 1) * block_size`.
/// On disk the value `0` means "no block" (list terminator, empty free list),
/// so in memory links are carried as `Option<Rbn>` and converted with
/// [`Rbn::from_raw`] / [`Rbn::to_raw`].
///
/// # Example
/// ```
/// use seqsetdb::Rbn;
///
/// assert_eq!(Rbn::ROOT.get(), 1);
/// assert_eq!(Rbn::from_raw(0), None);
/// assert_eq!(Rbn::to_raw(Some(Rbn::new(7))), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rbn(u32);

impl Rbn {
    /// The root always lives in block 1.
    pub const ROOT: Rbn = Rbn(1);

    /// Create a new Rbn.
    ///
    /// # Panics
    /// Panics if `n == 0`; zero is reserved for "no block".
    #[inline]
    pub fn new(n: u32) -> Self {
        assert!(n != 0, "RBN 0 is reserved for \"no block\"");
        Rbn(n)
    }

    /// Decode an on-disk link value, where `0` means none.
    #[inline]
    pub fn from_raw(n: u32) -> Option<Self> {
        if n == 0 {
            None
        } else {
            Some(Rbn(n))
        }
    }

    /// Encode a link for disk, mapping `None` to `0`.
    #[inline]
    pub fn to_raw(rbn: Option<Rbn>) -> u32 {
        rbn.map_or(0, |r| r.0)
    }

    /// The raw block number.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for Rbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rbn({})", self.0)
    }
}
