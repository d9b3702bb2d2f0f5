//! Incremental parsing of the binary BAM header.
//!
//! The header sits at the start of the decompressed stream and may span any
//! number of BGZF blocks:
//!
//! ```text
//! magic "BAM\1" | l_text i32 | text | n_ref i32 | n_ref × (l_name i32 | name\0 | l_ref i32)
//! ```
//!
//! [`HeaderParser::feed`] accepts one block at a time and reports where the
//! header ended inside the block that completed it, which is where record
//! data begins.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use libdeflater::Decompressor;

use crate::bgzf_reader::{BgzfBlockReader, decompress_into};
use crate::errors::{IndexError, Result};

/// BAM magic number.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// One `@SQ` entry from the binary reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub length: u32,
}

/// References in header order; a record's reference id indexes this table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    references: Vec<Reference>,
}

impl ReferenceTable {
    #[must_use]
    pub fn new(references: Vec<Reference>) -> Self {
        Self { references }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    #[must_use]
    pub fn get(&self, ref_id: usize) -> Option<&Reference> {
        self.references.get(ref_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }

    /// Reference id for `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.references.iter().position(|r| r.name == name)
    }
}

/// A parsed header.
#[derive(Debug, Clone, Default)]
pub struct BamHeader {
    /// SAM header text as stored (may be NUL padded).
    pub text: Vec<u8>,
    pub references: ReferenceTable,
}

/// Result of feeding bytes to a [`HeaderParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// The header continues in the next block.
    NeedMore,
    /// The header ended after `consumed` bytes of the slice just fed.
    Complete { consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Magic,
    TextLength,
    Text(usize),
    ReferenceCount,
    NameLength { left: usize },
    Name { left: usize, len: usize },
    ReferenceLength { left: usize },
    Done,
}

impl Stage {
    fn width(self) -> usize {
        match self {
            Self::Magic
            | Self::TextLength
            | Self::ReferenceCount
            | Self::NameLength { .. }
            | Self::ReferenceLength { .. } => 4,
            Self::Text(len) | Self::Name { len, .. } => len,
            Self::Done => 0,
        }
    }
}

/// Streaming parser for the binary header.
#[derive(Debug)]
pub struct HeaderParser {
    stage: Stage,
    field: Vec<u8>,
    header: BamHeader,
    pending_name: String,
    consumed: u64,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Magic,
            field: Vec::with_capacity(4),
            header: BamHeader::default(),
            pending_name: String::new(),
            consumed: 0,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Total header bytes consumed across all feeds.
    #[must_use]
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Consume header bytes from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Header`] on a bad magic number, a negative
    /// length, or a reference name that is not NUL terminated.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<HeaderStatus> {
        let mut cursor = 0;
        loop {
            if self.stage == Stage::Done {
                self.consumed += cursor as u64;
                return Ok(HeaderStatus::Complete { consumed: cursor });
            }
            let width = self.stage.width();
            let take = (width - self.field.len()).min(bytes.len() - cursor);
            self.field.extend_from_slice(&bytes[cursor..cursor + take]);
            cursor += take;
            if self.field.len() < width {
                self.consumed += cursor as u64;
                return Ok(HeaderStatus::NeedMore);
            }
            let field = std::mem::take(&mut self.field);
            self.stage = self.advance(&field)?;
        }
    }

    fn advance(&mut self, field: &[u8]) -> Result<Stage> {
        let stage = match self.stage {
            Stage::Magic => {
                if field != BAM_MAGIC {
                    return Err(header_error(format!("bad magic number {field:02x?}")));
                }
                Stage::TextLength
            }
            Stage::TextLength => Stage::Text(length(field, "l_text")?),
            Stage::Text(_) => {
                self.header.text = field.to_vec();
                Stage::ReferenceCount
            }
            Stage::ReferenceCount => match length(field, "n_ref")? {
                0 => Stage::Done,
                left => Stage::NameLength { left },
            },
            Stage::NameLength { left } => {
                let len = length(field, "l_name")?;
                if len == 0 {
                    return Err(header_error("reference name length is zero".to_string()));
                }
                Stage::Name { left, len }
            }
            Stage::Name { left, .. } => {
                let Some((&0, name)) = field.split_last() else {
                    return Err(header_error("reference name is not NUL terminated".to_string()));
                };
                self.pending_name = String::from_utf8_lossy(name).into_owned();
                Stage::ReferenceLength { left }
            }
            Stage::ReferenceLength { left } => {
                let length = u32::try_from(length(field, "l_ref")?).map_err(|_| {
                    header_error(format!("reference {} is too long", self.pending_name))
                })?;
                self.header
                    .references
                    .references
                    .push(Reference { name: std::mem::take(&mut self.pending_name), length });
                if left == 1 { Stage::Done } else { Stage::NameLength { left: left - 1 } }
            }
            Stage::Done => Stage::Done,
        };
        Ok(stage)
    }

    /// The parsed header.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Header`] if the header has not been fully fed.
    pub fn finish(self) -> Result<BamHeader> {
        if self.stage != Stage::Done {
            return Err(header_error(format!(
                "stream ended inside the header after {} bytes",
                self.consumed
            )));
        }
        Ok(self.header)
    }
}

fn header_error(reason: String) -> IndexError {
    IndexError::Header { reason }
}

fn length(field: &[u8], what: &str) -> Result<usize> {
    let value = i32::from_le_bytes([field[0], field[1], field[2], field[3]]);
    usize::try_from(value).map_err(|_| header_error(format!("negative {what}: {value}")))
}

/// Read just the header of a BAM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the header is malformed.
pub fn read_header(path: &Path) -> Result<BamHeader> {
    let mut reader = BgzfBlockReader::new(BufReader::new(File::open(path)?));
    let mut decompressor = Decompressor::new();
    let mut parser = HeaderParser::new();
    let mut data = Vec::new();
    while let Some(block) = reader.read_block()? {
        decompress_into(&block, &mut decompressor, &mut data)?;
        if let HeaderStatus::Complete { .. } = parser.feed(&data)? {
            break;
        }
    }
    parser.finish()
}
