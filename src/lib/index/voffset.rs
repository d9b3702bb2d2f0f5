//! BGZF virtual file offsets.

use std::fmt;

/// A BGZF virtual offset: the compressed start offset of a block in the high
/// 48 bits and a byte offset within its decompressed data in the low 16.
///
/// ```
/// # use bamidx_lib::index::VirtualOffset;
/// let offset = VirtualOffset::new(1024, 512);
/// assert_eq!(offset.compressed_offset(), 1024);
/// assert_eq!(offset.uncompressed_offset(), 512);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Create from a block's compressed offset and an offset within the block.
    #[must_use]
    pub const fn new(compressed: u64, uncompressed: u16) -> Self {
        Self((compressed << 16) | uncompressed as u64)
    }

    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Compressed offset of the block (high 48 bits).
    #[must_use]
    pub const fn compressed_offset(self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block (low 16 bits).
    #[must_use]
    pub const fn uncompressed_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed_offset(), self.uncompressed_offset())
    }
}
