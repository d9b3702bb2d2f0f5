//! Raw BGZF block reading and decompression.
//!
//! Blocks are read whole without inflating them, so decompression can run in
//! worker threads. Every block carries its sequential id and its compressed
//! offset in the file, which together with an offset inside the decompressed
//! data form a virtual offset.
//!
//! # BGZF Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                               │
//! │  - Magic: 0x1f 0x8b, method 0x08, flags 0x04 (FEXTRA)           │
//! │  - MTIME, XFL, OS, XLEN (= 6)                                   │
//! │  - Subfield: "BC" + len(2) + BSIZE(2), BSIZE = block size - 1   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Compressed data (deflate)                                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes): CRC32, ISIZE                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Empty blocks, including the EOF marker, are returned like any other block
//! so that compressed offsets stay exact.

use std::io::{self, Read};

use libdeflater::Decompressor;

use crate::errors::{IndexError, Result};

/// Size of the BGZF block header.
pub const BGZF_HEADER_SIZE: usize = 18;

/// Size of the BGZF block footer (CRC32 + ISIZE).
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Largest decompressed size a BGZF block may declare.
pub const BGZF_MAX_BLOCK_SIZE: usize = 64 * 1024;

/// BGZF EOF marker block.
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// A compressed BGZF block and where it came from.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    /// 0-based position of the block in the file.
    pub block_id: u64,
    /// Byte offset of the block's first header byte.
    pub coffset: u64,
    /// Header, deflate payload and footer.
    pub data: Vec<u8>,
}

impl CompressedBlock {
    /// Total compressed size, header and footer included.
    #[must_use]
    pub fn compressed_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Deflate payload between header and footer.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[BGZF_HEADER_SIZE..self.data.len() - BGZF_FOOTER_SIZE]
    }

    /// Decompressed size from the ISIZE field.
    #[must_use]
    pub fn uncompressed_size(&self) -> usize {
        let len = self.data.len();
        u32::from_le_bytes([self.data[len - 4], self.data[len - 3], self.data[len - 2], self.data[len - 1]])
            as usize
    }

    /// CRC32 of the decompressed data from the footer.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        let len = self.data.len();
        u32::from_le_bytes([self.data[len - 8], self.data[len - 7], self.data[len - 6], self.data[len - 5]])
    }

    /// True for blocks with no decompressed data, such as the EOF marker.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size() == 0
    }

    /// True for the exact BGZF EOF marker.
    #[must_use]
    pub fn is_eof_marker(&self) -> bool {
        self.data == BGZF_EOF
    }

    fn error(&self, message: String) -> IndexError {
        IndexError::Bgzf {
            block_id: self.block_id,
            coffset: self.coffset,
            source: io::Error::new(io::ErrorKind::InvalidData, message),
        }
    }
}

/// Sequential reader of compressed blocks.
#[derive(Debug)]
pub struct BgzfBlockReader<R> {
    inner: R,
    next_block_id: u64,
    coffset: u64,
}

impl<R: Read> BgzfBlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, next_block_id: 0, coffset: 0 }
    }

    /// Compressed offset of the next block.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.coffset
    }

    /// Blocks read so far.
    #[must_use]
    pub fn blocks_read(&self) -> u64 {
        self.next_block_id
    }

    /// Read one block; `Ok(None)` at a clean end of file.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Bgzf`] for a malformed header or a file that
    /// ends inside a block.
    pub fn read_block(&mut self) -> Result<Option<CompressedBlock>> {
        let block_id = self.next_block_id;
        let coffset = self.coffset;
        let wrap = |source: io::Error| IndexError::Bgzf { block_id, coffset, source };

        let mut header = [0u8; BGZF_HEADER_SIZE];
        let filled = read_fully(&mut self.inner, &mut header).map_err(wrap)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < BGZF_HEADER_SIZE {
            return Err(wrap(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file ends {filled} byte(s) into a block header"),
            )));
        }
        check_header(&header).map_err(wrap)?;

        let block_size = u16::from_le_bytes([header[16], header[17]]) as usize + 1;
        if block_size < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
            return Err(wrap(invalid(format!("BGZF block too small: {block_size} bytes"))));
        }
        let mut data = vec![0u8; block_size];
        data[..BGZF_HEADER_SIZE].copy_from_slice(&header);
        self.inner.read_exact(&mut data[BGZF_HEADER_SIZE..]).map_err(wrap)?;

        self.next_block_id += 1;
        self.coffset += block_size as u64;
        Ok(Some(CompressedBlock { block_id, coffset, data }))
    }

    /// Read up to `max_blocks` blocks. Returns fewer only at end of file.
    ///
    /// # Errors
    ///
    /// See [`Self::read_block`].
    pub fn read_batch(&mut self, max_blocks: usize) -> Result<Vec<CompressedBlock>> {
        let mut blocks = Vec::with_capacity(max_blocks);
        while blocks.len() < max_blocks {
            match self.read_block()? {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        Ok(blocks)
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn check_header(header: &[u8; BGZF_HEADER_SIZE]) -> io::Result<()> {
    if header[0] != 0x1f || header[1] != 0x8b {
        return Err(invalid(format!(
            "Invalid BGZF magic: expected 0x1f 0x8b, got 0x{:02x} 0x{:02x}",
            header[0], header[1]
        )));
    }
    if header[2] != 0x08 {
        return Err(invalid(format!("Invalid compression method: 0x{:02x}", header[2])));
    }
    if header[3] & 0x04 == 0 {
        return Err(invalid("BGZF block missing FEXTRA flag".to_string()));
    }
    if header[12] != b'B' || header[13] != b'C' {
        return Err(invalid(format!(
            "Invalid BGZF subfield ID: expected 'BC', got '{}{}'",
            header[12] as char, header[13] as char
        )));
    }
    Ok(())
}

/// Fill `buf` as far as the reader allows; returns the bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Inflate `block` into `output`, replacing its contents, and verify the
/// CRC32.
///
/// # Errors
///
/// Returns [`IndexError::Bgzf`] if the declared size is too large, inflation
/// fails, or the checksum does not match.
pub fn decompress_into(
    block: &CompressedBlock,
    decompressor: &mut Decompressor,
    output: &mut Vec<u8>,
) -> Result<()> {
    output.clear();
    let size = block.uncompressed_size();
    if size == 0 {
        return Ok(());
    }
    if size > BGZF_MAX_BLOCK_SIZE {
        return Err(block.error(format!("declared size {size} exceeds {BGZF_MAX_BLOCK_SIZE}")));
    }
    output.resize(size, 0);
    let written = decompressor
        .deflate_decompress(block.payload(), output)
        .map_err(|e| block.error(format!("BGZF decompression failed: {e:?}")))?;
    if written != size {
        return Err(block.error(format!("inflated {written} bytes but ISIZE is {size}")));
    }
    let actual = crc32fast::hash(output);
    if actual != block.crc32() {
        return Err(block.error(format!(
            "BGZF CRC32 mismatch: expected 0x{:08x}, got 0x{actual:08x}",
            block.crc32()
        )));
    }
    Ok(())
}
