//! Reassembly of length-prefixed records from decompressed BGZF blocks.
//!
//! BGZF block boundaries fall anywhere in the record stream: a record's
//! 4-byte length prefix, or its body, can be split across any number of
//! blocks. [`RecordReassembler`] is a two-state machine that carries a
//! partial record across [`RecordReassembler::feed`] calls and yields each
//! record once its last byte has arrived, together with its start and end
//! virtual offsets.
//!
//! ```text
//!              4 length bytes collected
//!   ReadingLength ───────────────────────▶ ReadingBody
//!        ▲                                     │
//!        └──────── block_size bytes copied ────┘
//! ```

use bamidx_record::RawRecord;

use crate::errors::{IndexError, Result};
use crate::index::VirtualOffset;

/// One decompressed BGZF block, or the tail of one.
#[derive(Debug, Clone, Copy)]
pub struct BlockSlice<'a> {
    /// Compressed offset of the block in the file.
    pub coffset: u64,
    /// Compressed size of the block, header and footer included.
    pub compressed_len: u64,
    /// The block's complete decompressed data.
    pub data: &'a [u8],
    /// Where record data starts in `data`. Non-zero only for the block that
    /// holds the end of the BAM header.
    pub offset: usize,
}

impl<'a> BlockSlice<'a> {
    /// A whole block with no header bytes to skip.
    #[must_use]
    pub fn new(coffset: u64, compressed_len: u64, data: &'a [u8]) -> Self {
        Self { coffset, compressed_len, data, offset: 0 }
    }

    /// Skip the first `offset` bytes of the block.
    #[must_use]
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Virtual offset of byte `position` in the block. The position just past
    /// the last byte is reported as the start of the next block.
    #[must_use]
    pub fn voffset_at(&self, position: usize) -> VirtualOffset {
        if position >= self.data.len() {
            VirtualOffset::new(self.coffset + self.compressed_len, 0)
        } else {
            VirtualOffset::new(self.coffset, position as u16)
        }
    }
}

/// A complete record and where it sits in the file.
#[derive(Debug, Clone, Copy)]
pub struct AssembledRecord<'r> {
    pub record: &'r RawRecord,
    /// Virtual offset of the record's length prefix.
    pub start: VirtualOffset,
    /// Virtual offset just past the record's last byte.
    pub end: VirtualOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// `have` of the 4 length-prefix bytes collected.
    ReadingLength { have: usize },
    /// `have` of `block_size` body bytes copied into the record.
    ReadingBody { block_size: usize, have: usize },
}

/// Turns a sequence of block slices into complete records.
#[derive(Debug)]
pub struct RecordReassembler {
    state: State,
    length: [u8; 4],
    start: VirtualOffset,
    record: RawRecord,
    records: u64,
}

impl Default for RecordReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::ReadingLength { have: 0 },
            length: [0; 4],
            start: VirtualOffset::default(),
            record: RawRecord::with_capacity(1024),
            records: 0,
        }
    }

    /// Records completed so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Bytes of an incomplete record held across feeds, length prefix
    /// included. Zero between records.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        match self.state {
            State::ReadingLength { have } => have,
            State::ReadingBody { have, .. } => 4 + have,
        }
    }

    /// Start consuming `slice`. Records are pulled from the returned
    /// [`Feed`]; bytes of a record that is still incomplete when the slice
    /// runs out stay buffered for the next call.
    ///
    /// # Panics
    ///
    /// Panics if `slice.offset` is past the end of the slice's data.
    pub fn feed<'a>(&'a mut self, slice: BlockSlice<'a>) -> Feed<'a> {
        assert!(
            slice.offset <= slice.data.len(),
            "slice offset {} past block length {}",
            slice.offset,
            slice.data.len()
        );
        Feed { cursor: slice.offset, slice, reassembler: self }
    }

    /// Check that the stream ended on a record boundary.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Truncated`] if a partial record is buffered.
    pub fn finish(&self) -> Result<()> {
        match self.pending_bytes() {
            0 => Ok(()),
            pending => Err(IndexError::Truncated { pending, voffset: self.start }),
        }
    }
}

/// Records completed by one [`RecordReassembler::feed`] call.
///
/// This is a lending iterator: each record borrows the reassembler's buffer,
/// so it must be dropped before the next call to [`Feed::next_record`].
#[derive(Debug)]
pub struct Feed<'a> {
    reassembler: &'a mut RecordReassembler,
    slice: BlockSlice<'a>,
    cursor: usize,
}

impl Feed<'_> {
    /// Next complete record, or `None` once the slice is exhausted.
    pub fn next_record(&mut self) -> Option<AssembledRecord<'_>> {
        let data = self.slice.data;
        loop {
            match self.reassembler.state {
                State::ReadingLength { have } => {
                    if self.cursor == data.len() {
                        return None;
                    }
                    if have == 0 {
                        self.reassembler.start = self.slice.voffset_at(self.cursor);
                    }
                    let block_size = if have == 0 && data.len() - self.cursor >= 4 {
                        let bytes = &data[self.cursor..self.cursor + 4];
                        self.cursor += 4;
                        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                    } else {
                        let n = (4 - have).min(data.len() - self.cursor);
                        self.reassembler.length[have..have + n]
                            .copy_from_slice(&data[self.cursor..self.cursor + n]);
                        self.cursor += n;
                        if have + n < 4 {
                            self.reassembler.state = State::ReadingLength { have: have + n };
                            return None;
                        }
                        u32::from_le_bytes(self.reassembler.length) as usize
                    };
                    self.reassembler.record.prepare(block_size);
                    self.reassembler.state = State::ReadingBody { block_size, have: 0 };
                }
                State::ReadingBody { block_size, have } => {
                    let n = (block_size - have).min(data.len() - self.cursor);
                    self.reassembler.record.extend_from_slice(&data[self.cursor..self.cursor + n]);
                    self.cursor += n;
                    if have + n < block_size {
                        self.reassembler.state = State::ReadingBody { block_size, have: have + n };
                        return None;
                    }
                    self.reassembler.state = State::ReadingLength { have: 0 };
                    self.reassembler.records += 1;
                    return Some(AssembledRecord {
                        record: &self.reassembler.record,
                        start: self.reassembler.start,
                        end: self.slice.voffset_at(self.cursor),
                    });
                }
            }
        }
    }

    /// Position of the next unread byte in the slice's data.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }
}
